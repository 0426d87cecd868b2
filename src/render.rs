use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;

/// Produces a full-page image of a URL. Used only on the single-target path.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, proxy: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Renders nothing; targets then carry no image location.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

#[async_trait]
impl Renderer for NoRenderer {
    async fn render(&self, _url: &str, _proxy: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Drives a headless Chromium-compatible binary through the proxy.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    pub bin: String,
    pub timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    fn args(&self, url: &str, proxy: &str, output: &str) -> Vec<String> {
        vec![
            "--headless".to_owned(),
            "--disable-gpu".to_owned(),
            "--disable-extensions".to_owned(),
            "--disable-blink-features=AutomationControlled".to_owned(),
            "--no-first-run".to_owned(),
            "--no-default-browser-check".to_owned(),
            "--ignore-certificate-errors".to_owned(),
            "--no-sandbox".to_owned(),
            "--window-size=1920,1080".to_owned(),
            format!("--proxy-server={}", chromium_proxy(proxy)),
            format!("--screenshot={output}"),
            url.to_owned(),
        ]
    }
}

fn chromium_proxy(proxy: &str) -> String {
    // Chromium resolves through the proxy for socks5 already and rejects `socks5h`.
    let address = proxy
        .split_once("://")
        .map(|(_, address)| address)
        .unwrap_or(proxy);
    format!("socks5://{address}")
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &str, proxy: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let output = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .context("create screenshot temp file")?;
        let output_path = output.path().to_string_lossy().into_owned();

        tracing::info!(bin = %self.bin, url, "rendering page");
        let mut child = Command::new(&self.bin)
            .args(self.args(url, proxy, &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn renderer: {}", self.bin))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .with_context(|| format!("renderer timed out after {:?}", self.timeout))?
            .context("wait renderer")?;
        if !status.success() {
            anyhow::bail!("renderer failed ({status})");
        }

        let image = tokio::fs::read(&output_path)
            .await
            .context("read screenshot")?;
        if image.is_empty() {
            anyhow::bail!("renderer produced an empty image for {url}");
        }
        Ok(Some(image))
    }
}
