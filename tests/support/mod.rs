#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ctiscan::app::context::Context;
use ctiscan::app::model::{PostText, Severity, SeveritySummary, Target, WorkItem, WorkStatus};
use ctiscan::app::store::{SqliteStore, Store};
use ctiscan::config::Config;
use ctiscan::engine::ForumEngine;
use ctiscan::error::StoreError;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub struct StubServer {
    pub base_url: String,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for StubServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Serves `route(path) -> (status, body)` and appends `request <path>` to
/// `events` on every request it receives.
pub fn spawn_server<F>(events: EventLog, route: F) -> StubServer
where
    F: Fn(&str) -> (u16, String) + Send + 'static,
{
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };
            let path = request.url().to_string();
            events.lock().unwrap().push(format!("request {path}"));
            let (status, body) = route(&path);
            let _ = request.respond(
                tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(
                        "Content-Type: text/html; charset=utf-8"
                            .parse::<tiny_http::Header>()
                            .unwrap(),
                    ),
            );
        }
    });

    StubServer {
        base_url,
        shutdown: shutdown_tx,
        handle: Some(handle),
    }
}

pub fn tor_reply(is_tor: bool) -> String {
    format!(r#"{{"IsTor":{is_tor},"IP":"185.220.101.4"}}"#)
}

pub fn thread_page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <body>
    <h1 class="p-title-value">{title}</h1>
    <article class="message" data-author="seller">
      <time class="u-dt" datetime="2024-03-01T10:00:00+0000">Mar 1, 2024</time>
      <div class="bbWrapper">{body}</div>
    </article>
  </body>
</html>
"#
    )
}

/// Fast retry settings pointed at a local check endpoint.
pub fn test_config(output_dir: &std::path::Path, check_url: String) -> Config {
    Config {
        timeout: Duration::from_secs(5),
        max_retries: 3,
        backoff_unit: Duration::from_millis(1),
        check_url,
        output_dir: output_dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn context(config: Config, store: Arc<dyn Store>) -> Arc<Context> {
    context_with_cancel(config, store, CancellationToken::new())
}

pub fn context_with_cancel(
    config: Config,
    store: Arc<dyn Store>,
    cancel: CancellationToken,
) -> Arc<Context> {
    let client = ctiscan::proxy::direct_client(config.timeout).unwrap();
    let mut ctx = Context::new(config, client, store);
    ctx.cancel = cancel;
    Arc::new(ctx)
}

pub async fn xenforo_target(store: &dyn Store, url: &str) -> Target {
    let target = Target {
        target_id: uuid::Uuid::new_v4().to_string(),
        name: "forum".to_owned(),
        url: url.to_owned(),
        description: String::new(),
        last_scanned: None,
        engine: None,
        document_location: None,
        image_location: None,
    };
    store.insert_target(&target).await.unwrap();
    store
        .record_target_fetch(
            &target.target_id,
            Utc::now(),
            ForumEngine::XenForo,
            "unused.html",
            None,
        )
        .await
        .unwrap();
    store.get_target(&target.target_id).await.unwrap().unwrap()
}

/// Store that logs `status <url>` into the shared event log on every status write.
pub struct RecordingStore {
    pub inner: SqliteStore,
    pub events: EventLog,
    /// `record_target_fetch` fails for this target id.
    pub reject_fetch_record: Option<String>,
    /// Cancelled right after every status write.
    pub cancel_on_status: Option<CancellationToken>,
}

impl RecordingStore {
    pub fn new(events: &EventLog) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            events: Arc::clone(events),
            reject_fetch_record: None,
            cancel_on_status: None,
        }
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn insert_target(&self, target: &Target) -> Result<(), StoreError> {
        self.inner.insert_target(target).await
    }

    async fn get_target(&self, target_id: &str) -> Result<Option<Target>, StoreError> {
        self.inner.get_target(target_id).await
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        self.inner.list_targets().await
    }

    async fn delete_target(&self, target_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_target(target_id).await
    }

    async fn record_target_fetch(
        &self,
        target_id: &str,
        scanned_at: DateTime<Utc>,
        engine: ForumEngine,
        document_location: &str,
        image_location: Option<&str>,
    ) -> Result<(), StoreError> {
        if self.reject_fetch_record.as_deref() == Some(target_id) {
            return Err(StoreError::Corrupt(format!("no target row {target_id}")));
        }
        self.inner
            .record_target_fetch(target_id, scanned_at, engine, document_location, image_location)
            .await
    }

    async fn insert_work_items(&self, target_id: &str, urls: &[String]) -> Result<usize, StoreError> {
        self.inner.insert_work_items(target_id, urls).await
    }

    async fn get_work_item(&self, item_id: &str) -> Result<Option<WorkItem>, StoreError> {
        self.inner.get_work_item(item_id).await
    }

    async fn list_work_items(&self, target_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        self.inner.list_work_items(target_id).await
    }

    async fn pending_work_items(&self, target_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        self.inner.pending_work_items(target_id).await
    }

    async fn update_work_item_content(&self, item_id: &str, post: &PostText) -> Result<(), StoreError> {
        self.inner.update_work_item_content(item_id, post).await
    }

    async fn set_work_item_status(&self, item_id: &str, status: WorkStatus) -> Result<(), StoreError> {
        let item = self.inner.get_work_item(item_id).await?;
        self.inner.set_work_item_status(item_id, status).await?;
        if let Some(item) = item {
            let path = url::Url::parse(&item.url)
                .map(|url| url.path().to_owned())
                .unwrap_or(item.url);
            self.events.lock().unwrap().push(format!("status {path}"));
        }
        if let Some(cancel) = &self.cancel_on_status {
            cancel.cancel();
        }
        Ok(())
    }

    async fn set_work_item_severity(&self, item_id: &str, severity: Severity) -> Result<(), StoreError> {
        self.inner.set_work_item_severity(item_id, severity).await
    }

    async fn reset_failed(&self, target_id: &str) -> Result<usize, StoreError> {
        self.inner.reset_failed(target_id).await
    }

    async fn severity_summary(&self, target_id: &str) -> Result<SeveritySummary, StoreError> {
        self.inner.severity_summary(target_id).await
    }
}
