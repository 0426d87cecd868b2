use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::severity::SeverityPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_CHECK_URL: &str = "https://check.torproject.org/api/ip";

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Backoff after failed attempt `n` (1-based) is `n * 2 * backoff_unit`.
    pub backoff_unit: Duration,
    pub batch_size: usize,
    /// Politeness delay before every request attempt.
    pub request_delay: Duration,

    pub tor_proxy: String,
    pub check_url: String,

    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,

    pub renderer_bin: Option<String>,
    pub severity_keywords: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay: Duration::ZERO,
            tor_proxy: "127.0.0.1:9050".to_owned(),
            check_url: DEFAULT_CHECK_URL.to_owned(),
            output_dir: PathBuf::from("output"),
            db_path: PathBuf::from("db/database.db"),
            log_dir: None,
            renderer_bin: None,
            severity_keywords: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = get("CTISCAN_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_u64("CTISCAN_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get("CTISCAN_MAX_RETRIES") {
            config.max_retries = raw
                .parse::<u32>()
                .with_context(|| format!("invalid CTISCAN_MAX_RETRIES={raw:?}"))?;
        }
        if let Some(raw) = get("CTISCAN_BACKOFF_UNIT_MS") {
            config.backoff_unit =
                Duration::from_millis(parse_u64("CTISCAN_BACKOFF_UNIT_MS", &raw)?);
        }
        if let Some(raw) = get("CTISCAN_WORKERS") {
            config.batch_size = batch_size_or_default(raw.parse::<i64>().ok());
        }
        if let Some(raw) = get("CTISCAN_REQUEST_DELAY_MS") {
            config.request_delay =
                Duration::from_millis(parse_u64("CTISCAN_REQUEST_DELAY_MS", &raw)?);
        }
        if let Some(raw) = get("CTISCAN_TOR_PROXY") {
            config.tor_proxy = raw;
        }
        if let Some(raw) = get("CTISCAN_CHECK_URL") {
            config.check_url = raw;
        }
        if let Some(raw) = get("CTISCAN_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(raw);
        }
        if let Some(raw) = get("CTISCAN_DB") {
            config.db_path = PathBuf::from(raw);
        }
        config.log_dir = get("CTISCAN_LOG_DIR").map(PathBuf::from);
        config.renderer_bin = get("CTISCAN_RENDERER_BIN");
        config.severity_keywords = get("CTISCAN_SEVERITY_KEYWORDS").map(PathBuf::from);

        Ok(config)
    }

    pub fn severity_policy(&self) -> anyhow::Result<SeverityPolicy> {
        match &self.severity_keywords {
            Some(path) => SeverityPolicy::load(path),
            None => Ok(SeverityPolicy::default()),
        }
    }
}

/// Non-positive or missing sizes fall back to the default.
pub fn batch_size_or_default(raw: Option<i64>) -> usize {
    match raw {
        Some(size) if size > 0 => usize::try_from(size).unwrap_or(DEFAULT_BATCH_SIZE),
        _ => DEFAULT_BATCH_SIZE,
    }
}

fn parse_u64(key: &str, raw: &str) -> anyhow::Result<u64> {
    raw.parse::<u64>()
        .with_context(|| format!("invalid {key}={raw:?}: expected a non-negative integer"))
}
