use serde::{Deserialize, Serialize};

use crate::error::{Error, FetchError};

/// Answer of the Tor Project check endpoint (`/api/ip`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorStatus {
    #[serde(rename = "IsTor")]
    pub routed_through_proxy: bool,
    #[serde(rename = "IP", default)]
    pub exit_address: String,
}

pub async fn verify(client: &reqwest::Client, check_url: &str) -> Result<TorStatus, Error> {
    let response = client.get(check_url).send().await.map_err(|err| {
        if err.is_timeout() {
            FetchError::Timeout {
                url: check_url.to_owned(),
                attempts: 1,
            }
        } else {
            FetchError::Connection {
                url: check_url.to_owned(),
                attempts: 1,
                source: err,
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            url: check_url.to_owned(),
            status,
        }
        .into());
    }

    let body = response.bytes().await.map_err(|err| FetchError::Connection {
        url: check_url.to_owned(),
        attempts: 1,
        source: err,
    })?;
    serde_json::from_slice(&body).map_err(|err| Error::Parse(format!("anonymity check reply: {err}")))
}

/// Verifies routing once and refuses to continue over a non-anonymized path.
pub async fn require_anonymity(
    client: &reqwest::Client,
    check_url: &str,
) -> Result<TorStatus, Error> {
    let status = verify(client, check_url).await?;
    if !status.routed_through_proxy {
        tracing::error!(exit = %status.exit_address, "not connected to the anonymizing proxy");
        return Err(Error::PolicyViolation {
            exit_address: status.exit_address,
        });
    }
    tracing::info!(exit = %status.exit_address, "connected through anonymizing proxy");
    Ok(status)
}
