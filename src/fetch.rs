use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff_unit: Duration,
    pub request_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.timeout,
            backoff_unit: config.backoff_unit,
            request_delay: config.request_delay,
        }
    }

    /// Linear backoff after the `attempt`-th (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_mul(2))
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub status: reqwest::StatusCode,
    pub attempts: u32,
}

impl Fetched {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// GET `url`, retrying transport failures only.
///
/// Non-2xx replies fail at once. A failed body read counts as a transport
/// failure of that attempt. At least one attempt is always made.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Fetched, FetchError> {
    let max_attempts = policy.max_retries.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: url.to_owned() });
        }
        if !policy.request_delay.is_zero() {
            pause(policy.request_delay, url, cancel).await?;
        }

        let err = match client.get(url).timeout(policy.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(url, %status, "request rejected");
                    return Err(FetchError::Http {
                        url: url.to_owned(),
                        status,
                    });
                }
                match response.bytes().await {
                    Ok(body) => {
                        tracing::debug!(url, attempt, bytes = body.len(), "fetched");
                        return Ok(Fetched {
                            body: body.to_vec(),
                            status,
                            attempts: attempt,
                        });
                    }
                    Err(err) => err,
                }
            }
            Err(err) => err,
        };

        tracing::warn!(url, attempt, max_attempts, error = %err, "request failed");
        if attempt >= max_attempts {
            return Err(transport_error(url, attempt, err));
        }
        pause(policy.backoff(attempt), url, cancel).await?;
    }
}

async fn pause(delay: Duration, url: &str, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled { url: url.to_owned() }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn transport_error(url: &str, attempts: u32, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_owned(),
            attempts,
        }
    } else {
        FetchError::Connection {
            url: url.to_owned(),
            attempts,
            source: err,
        }
    }
}
