use std::collections::HashSet;
use std::sync::Arc;

use crate::app::context::Context;
use crate::app::model::{PassOutcome, PassReport, Severity, WorkItem, WorkStatus};
use crate::app::queue::BatchQueue;
use crate::engine::ForumEngine;
use crate::error::{Error, Result, StoreError};
use crate::extract::{self, ExtractionStrategy};
use crate::fetch::{self, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Scraped,
    Failed,
    /// Cancelled before finishing; the item stays pending.
    Interrupted,
}

/// One scheduling pass over the pending work items of a target.
///
/// Pass-level failures (anonymity, loading the job list) come back as an
/// aborted report; per-job failures only mark that job `failed`.
pub async fn run_pass(ctx: &Arc<Context>, target_id: &str) -> Result<PassReport> {
    let loaded = async {
        let target = ctx.store.get_target(target_id).await?;
        let jobs = ctx.store.pending_work_items(target_id).await?;
        Ok::<_, StoreError>((target, jobs))
    };
    let (target, jobs) = match loaded.await {
        Ok((Some(target), jobs)) => (target, dedup_by_id(jobs)),
        Ok((None, _)) => return Err(Error::NotFound(format!("target {target_id}"))),
        Err(err) => {
            tracing::error!(target_id, error = %err, "could not load pending work items");
            return Ok(PassReport::aborted(target_id, err.to_string()));
        }
    };

    if let Err(err) = crate::gate::require_anonymity(&ctx.client, &ctx.config.check_url).await {
        tracing::error!(target_id, error = %err, "anonymity check failed; aborting pass");
        return Ok(PassReport::aborted(target_id, err.to_string()));
    }

    let engine = target.engine.unwrap_or(ForumEngine::Unknown);
    let strategy = ctx.strategies.resolve(engine).ok();
    if strategy.is_none() && !jobs.is_empty() {
        tracing::warn!(target_id, %engine, "no extraction strategy; jobs will fail");
    }

    let queue = BatchQueue::new(ctx.config.batch_size);
    let mut report = PassReport {
        target_id: target_id.to_owned(),
        outcome: PassOutcome::Completed,
        batch_sizes: Vec::new(),
        scraped: 0,
        failed: 0,
    };
    let total = jobs.len();
    let mut interrupted = false;

    for (index, batch) in queue.partition(&jobs).enumerate() {
        if ctx.cancel.is_cancelled() {
            interrupted = true;
            break;
        }
        let start = index * queue.width();
        tracing::info!(target_id, start, end = start + batch.len() - 1, total, "processing batch");

        let workers = batch.iter().cloned().map(|item| {
            let ctx = Arc::clone(ctx);
            let strategy = strategy.clone();
            async move { run_job(&ctx, strategy.as_deref(), engine, &item).await }
        });
        for result in queue.run_batch(workers).await {
            match result {
                Ok(JobOutcome::Scraped) => report.scraped += 1,
                Ok(JobOutcome::Failed) => report.failed += 1,
                Ok(JobOutcome::Interrupted) => interrupted = true,
                Err(err) => {
                    tracing::error!(target_id, error = %err, "worker panicked");
                    report.failed += 1;
                }
            }
        }
        report.batch_sizes.push(batch.len());
        tracing::info!(target_id, size = batch.len(), "batch finished");
    }

    if interrupted {
        report.outcome = PassOutcome::Aborted {
            reason: Error::Cancelled.to_string(),
        };
        tracing::warn!(target_id, scraped = report.scraped, failed = report.failed, "pass cancelled");
    } else {
        tracing::info!(target_id, scraped = report.scraped, failed = report.failed, "pass completed");
    }
    Ok(report)
}

fn dedup_by_id(jobs: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| seen.insert(job.item_id.clone()))
        .collect()
}

async fn run_job(
    ctx: &Context,
    strategy: Option<&dyn ExtractionStrategy>,
    engine: ForumEngine,
    item: &WorkItem,
) -> JobOutcome {
    tracing::debug!(item_id = %item.item_id, url = %item.url, "processing job");
    let (outcome, status) = match process(ctx, strategy, engine, item).await {
        Ok(severity) => {
            tracing::info!(item_id = %item.item_id, %severity, "job scraped");
            (JobOutcome::Scraped, WorkStatus::Scraped)
        }
        Err(err) if err.is_cancelled() => {
            tracing::info!(item_id = %item.item_id, "job interrupted; left pending");
            return JobOutcome::Interrupted;
        }
        Err(err) => {
            tracing::error!(item_id = %item.item_id, url = %item.url, error = %err, "job failed");
            (JobOutcome::Failed, WorkStatus::Failed)
        }
    };

    if let Err(err) = ctx.store.set_work_item_status(&item.item_id, status).await {
        tracing::error!(item_id = %item.item_id, %status, error = %err, "could not record job status");
    }
    outcome
}

async fn process(
    ctx: &Context,
    strategy: Option<&dyn ExtractionStrategy>,
    engine: ForumEngine,
    item: &WorkItem,
) -> Result<Severity> {
    let strategy = strategy.ok_or(Error::UnsupportedEngine(engine))?;

    let policy = RetryPolicy::from_config(&ctx.config);
    let fetched = fetch::fetch(&ctx.client, &item.url, &policy, &ctx.cancel).await?;
    ctx.artifacts
        .write(&item.url, &fetched.body, None)
        .await
        .map_err(Error::Artifact)?;

    let post = extract::post_text(strategy, &fetched.text());
    if post.body.is_empty() {
        return Err(Error::Parse(format!("no post body blocks in {}", item.url)));
    }
    ctx.store
        .update_work_item_content(&item.item_id, &post)
        .await?;

    let severity = ctx.severity.classify(&post.body);
    ctx.store
        .set_work_item_severity(&item.item_id, severity)
        .await?;
    Ok(severity)
}
