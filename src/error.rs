use thiserror::Error;

use crate::engine::ForumEngine;

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed fetch. Only `Timeout` and `Connection` are retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} timed out after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("GET {url} failed after {attempts} attempt(s): {source}")]
    Connection {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP {status}")]
    Http {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("GET {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::Connection { attempts, .. } => *attempts,
            Self::Http { .. } => 1,
            Self::Cancelled { .. } => 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("traffic is not routed through the anonymizing proxy (exit address {exit_address})")]
    PolicyViolation { exit_address: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("parse: {0}")]
    Parse(String),

    #[error("no extraction strategy registered for engine {0}")]
    UnsupportedEngine(ForumEngine),

    #[error("target {target_id} has no fetched document yet; fetch it first")]
    MissingArtifact { target_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("artifact: {0:#}")]
    Artifact(anyhow::Error),

    #[error("render: {0:#}")]
    Render(anyhow::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// True when the error must abort a whole pass rather than a single job.
    pub fn is_fatal_for_pass(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. } | Self::Store(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Fetch(FetchError::Cancelled { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, FetchError, StoreError};

    #[test]
    fn only_policy_and_store_errors_abort_a_pass() {
        let policy = Error::PolicyViolation {
            exit_address: "203.0.113.7".to_owned(),
        };
        assert!(policy.is_fatal_for_pass());

        let store = Error::Store(StoreError::Corrupt("bad status".to_owned()));
        assert!(store.is_fatal_for_pass());

        let http = Error::Fetch(FetchError::Http {
            url: "http://x.onion/".to_owned(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        });
        assert!(!http.is_fatal_for_pass());
        assert!(!Error::Parse("broken".to_owned()).is_fatal_for_pass());
    }

    #[test]
    fn cancelled_fetch_counts_as_cancellation() {
        let err = Error::Fetch(FetchError::Cancelled {
            url: "http://x.onion/".to_owned(),
        });
        assert!(err.is_cancelled());
        assert_eq!(
            FetchError::Cancelled {
                url: String::new()
            }
            .attempts(),
            0
        );
    }
}
