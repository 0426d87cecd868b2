pub mod artifact_store;
pub mod context;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod store;
