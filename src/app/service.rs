use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use url::Url;

use crate::app::context::Context;
use crate::app::model::{NewTarget, PassReport, SeveritySummary, Target, WorkItem};
use crate::error::{Error, Result};
use crate::fetch::{self, RetryPolicy};

pub async fn register_target(ctx: &Context, new: NewTarget) -> Result<Target> {
    let name = new.name.trim();
    let url = new.url.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("target name must not be empty".to_owned()));
    }
    if url.is_empty() {
        return Err(Error::InvalidInput("target url must not be empty".to_owned()));
    }
    let parsed =
        Url::parse(url).map_err(|err| Error::InvalidInput(format!("target url {url}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidInput(format!(
            "target url must be http(s) with a host: {url}"
        )));
    }

    let target = Target {
        target_id: uuid::Uuid::new_v4().to_string(),
        name: name.to_owned(),
        url: url.to_owned(),
        description: new.description.trim().to_owned(),
        last_scanned: None,
        engine: None,
        document_location: None,
        image_location: None,
    };
    ctx.store.insert_target(&target).await?;
    tracing::info!(target_id = %target.target_id, url = %target.url, "target registered");
    Ok(target)
}

pub async fn list_targets(ctx: &Context) -> Result<Vec<Target>> {
    Ok(ctx.store.list_targets().await?)
}

pub async fn get_target(ctx: &Context, target_id: &str) -> Result<Target> {
    ctx.store
        .get_target(target_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("target {target_id}")))
}

/// Removes the target row only; its work items stay in place.
pub async fn delete_target(ctx: &Context, target_id: &str) -> Result<()> {
    if !ctx.store.delete_target(target_id).await? {
        return Err(Error::NotFound(format!("target {target_id}")));
    }
    tracing::info!(target_id, "target deleted");
    Ok(())
}

/// Fetches a target's landing page through the proxy, stores the document
/// (and a rendered image when a renderer is configured), identifies the
/// forum engine and records all of it on the target.
pub async fn fetch_target(ctx: &Context, target_id: &str) -> Result<Target> {
    let target = get_target(ctx, target_id).await?;
    crate::gate::require_anonymity(&ctx.client, &ctx.config.check_url).await?;

    tracing::info!(target_id, url = %target.url, "fetching target");
    let policy = RetryPolicy::from_config(&ctx.config);
    let fetched = fetch::fetch(&ctx.client, &target.url, &policy, &ctx.cancel).await?;
    let image = ctx
        .renderer
        .render(&target.url, &ctx.config.tor_proxy)
        .await
        .map_err(Error::Render)?;
    let locations = ctx
        .artifacts
        .write(&target.url, &fetched.body, image.as_deref())
        .await
        .map_err(Error::Artifact)?;

    let engine = crate::engine::identify(&fetched.text());
    ctx.store
        .record_target_fetch(
            target_id,
            Utc::now(),
            engine,
            &locations.document,
            locations.image.as_deref(),
        )
        .await?;
    tracing::info!(target_id, %engine, attempts = fetched.attempts, "target fetched");
    get_target(ctx, target_id).await
}

#[derive(Debug, Default, Serialize)]
pub struct FetchAllReport {
    pub fetched: Vec<String>,
    pub failed: Vec<FailedTarget>,
}

#[derive(Debug, Serialize)]
pub struct FailedTarget {
    pub target_id: String,
    pub error: String,
}

/// Fetches every registered target in turn. A policy violation stops the
/// run; other failures are collected.
pub async fn fetch_all_targets(ctx: &Context) -> Result<FetchAllReport> {
    let targets = ctx.store.list_targets().await?;
    let mut report = FetchAllReport::default();
    for target in targets {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match fetch_target(ctx, &target.target_id).await {
            Ok(_) => report.fetched.push(target.target_id),
            Err(err @ Error::PolicyViolation { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(target_id = %target.target_id, error = %err, "target fetch failed");
                report.failed.push(FailedTarget {
                    target_id: target.target_id,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub target_id: String,
    pub links: usize,
}

pub async fn extract(ctx: &Context, target_id: &str) -> Result<ExtractReport> {
    let links = crate::extract::extract_for_target(ctx, target_id).await?;
    Ok(ExtractReport {
        target_id: target_id.to_owned(),
        links,
    })
}

pub async fn scan(ctx: &Arc<Context>, target_id: &str) -> Result<PassReport> {
    crate::app::scheduler::run_pass(ctx, target_id).await
}

pub async fn list_work_items(ctx: &Context, target_id: &str) -> Result<Vec<WorkItem>> {
    get_target(ctx, target_id).await?;
    Ok(ctx.store.list_work_items(target_id).await?)
}

/// Puts failed work items of a target back to pending. Returns how many moved.
pub async fn reset_failed(ctx: &Context, target_id: &str) -> Result<usize> {
    let reset = ctx.store.reset_failed(target_id).await?;
    tracing::info!(target_id, reset, "failed work items reset to pending");
    Ok(reset)
}

pub async fn severity_summary(ctx: &Context, target_id: &str) -> Result<SeveritySummary> {
    get_target(ctx, target_id).await?;
    Ok(ctx.store.severity_summary(target_id).await?)
}
