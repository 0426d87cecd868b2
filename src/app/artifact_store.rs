use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use sha2::Digest as _;
use tokio::fs;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLocations {
    pub document: String,
    pub image: Option<String>,
}

/// Persists raw fetched pages (and optional rendered images).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn write(
        &self,
        page_url: &str,
        document: &[u8],
        image: Option<&[u8]>,
    ) -> anyhow::Result<ArtifactLocations>;

    async fn read_document(&self, location: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct LocalFsArtifactStore {
    base_dir: PathBuf,
}

impl LocalFsArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn html_dir(&self, host: &str) -> PathBuf {
        self.base_dir.join("html").join(host)
    }

    fn screenshot_dir(&self, host: &str) -> PathBuf {
        self.base_dir.join("screenshots").join(host)
    }
}

#[async_trait]
impl ArtifactStore for LocalFsArtifactStore {
    async fn write(
        &self,
        page_url: &str,
        document: &[u8],
        image: Option<&[u8]>,
    ) -> anyhow::Result<ArtifactLocations> {
        let url = Url::parse(page_url).with_context(|| format!("parse page url: {page_url}"))?;
        let host = host_segment(&url)?;
        let stem = artifact_stem(page_url, document);

        let document_path = self.html_dir(&host).join(format!("{stem}.html"));
        write_atomic(&document_path, document)
            .await
            .context("write document")?;

        let image_path = match image {
            Some(bytes) => {
                let path = self.screenshot_dir(&host).join(format!("{stem}.png"));
                write_atomic(&path, bytes).await.context("write image")?;
                Some(path.to_string_lossy().into_owned())
            }
            None => None,
        };

        tracing::debug!(url = page_url, document = %document_path.display(), "stored artifacts");
        Ok(ArtifactLocations {
            document: document_path.to_string_lossy().into_owned(),
            image: image_path,
        })
    }

    async fn read_document(&self, location: &str) -> anyhow::Result<String> {
        let bytes = fs::read(location)
            .await
            .with_context(|| format!("read document: {location}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn host_segment(url: &Url) -> anyhow::Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("url must have host: {url}"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_owned(),
    })
}

/// `<utc timestamp>_<hash prefix>`; the hash covers URL and body so two pages
/// fetched in the same second do not collide.
fn artifact_stem(page_url: &str, document: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(page_url.as_bytes());
    hasher.update(document);
    let digest = hex::encode(hasher.finalize());
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    format!("{timestamp}_{}", &digest[..16])
}

async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
