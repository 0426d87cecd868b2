use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::app::artifact_store::{ArtifactStore, LocalFsArtifactStore};
use crate::app::store::{SqliteStore, Store};
use crate::config::Config;
use crate::engine::ForumEngine;
use crate::extract::StrategyTable;
use crate::render::{ChromiumRenderer, NoRenderer, Renderer};
use crate::severity::SeverityPolicy;

/// Everything an operation needs, built once at process start and passed
/// to every call.
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub client: reqwest::Client,
    pub store: Arc<dyn Store>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub renderer: Arc<dyn Renderer>,
    pub strategies: StrategyTable,
    pub severity: SeverityPolicy,
    /// Cancelling stops a running pass between requests.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client = crate::proxy::tor_client(&config).context("build proxy client")?;
        let store = SqliteStore::open(&config.db_path)
            .with_context(|| format!("open database: {}", config.db_path.display()))?;
        let renderer: Arc<dyn Renderer> = match &config.renderer_bin {
            Some(bin) => {
                tracing::info!(bin = %bin, "page rendering enabled");
                Arc::new(ChromiumRenderer::new(bin.clone(), config.timeout))
            }
            None => Arc::new(NoRenderer),
        };
        let severity = config.severity_policy().context("load severity policy")?;

        let mut ctx = Self::new(config, client, Arc::new(store));
        ctx.renderer = renderer;
        ctx.severity = severity;
        let engines: Vec<&str> = ctx
            .strategies
            .engines()
            .into_iter()
            .map(ForumEngine::as_str)
            .collect();
        tracing::info!(?engines, "extraction strategies registered");
        Ok(ctx)
    }

    /// Context over an already-built client and store, with local artifacts
    /// under `config.output_dir`, no renderer and the default severity policy.
    pub fn new(config: Config, client: reqwest::Client, store: Arc<dyn Store>) -> Self {
        Self {
            client,
            store,
            artifacts: Arc::new(LocalFsArtifactStore::new(config.output_dir.clone())),
            renderer: Arc::new(NoRenderer),
            strategies: StrategyTable::with_defaults(),
            severity: SeverityPolicy::default(),
            cancel: CancellationToken::new(),
            config,
        }
    }
}
