#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod gate;
pub mod logging;
pub mod proxy;
pub mod render;
pub mod severity;
