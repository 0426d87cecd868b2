use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use crate::app::model::{PostText, Severity, SeveritySummary, Target, WorkItem, WorkStatus};
use crate::engine::ForumEngine;
use crate::error::StoreError;

type StoreResult<T> = Result<T, StoreError>;

/// Relational persistence for targets and work items.
///
/// Every method is one independently committed statement.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_target(&self, target: &Target) -> StoreResult<()>;
    async fn get_target(&self, target_id: &str) -> StoreResult<Option<Target>>;
    async fn list_targets(&self) -> StoreResult<Vec<Target>>;
    /// Leaves the target's work items in place.
    async fn delete_target(&self, target_id: &str) -> StoreResult<bool>;
    async fn record_target_fetch(
        &self,
        target_id: &str,
        scanned_at: DateTime<Utc>,
        engine: ForumEngine,
        document_location: &str,
        image_location: Option<&str>,
    ) -> StoreResult<()>;

    /// Adds pending items for URLs not yet known under the target; returns how many were new.
    async fn insert_work_items(&self, target_id: &str, urls: &[String]) -> StoreResult<usize>;
    async fn get_work_item(&self, item_id: &str) -> StoreResult<Option<WorkItem>>;
    async fn list_work_items(&self, target_id: &str) -> StoreResult<Vec<WorkItem>>;
    async fn pending_work_items(&self, target_id: &str) -> StoreResult<Vec<WorkItem>>;
    async fn update_work_item_content(&self, item_id: &str, post: &PostText) -> StoreResult<()>;
    async fn set_work_item_status(&self, item_id: &str, status: WorkStatus) -> StoreResult<()>;
    async fn set_work_item_severity(&self, item_id: &str, severity: Severity)
    -> StoreResult<()>;
    /// Operator reset: failed items of the target become pending again.
    async fn reset_failed(&self, target_id: &str) -> StoreResult<usize>;
    async fn severity_summary(&self, target_id: &str) -> StoreResult<SeveritySummary>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (
    target_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    last_scanned TEXT,
    engine TEXT,
    document_location TEXT,
    image_location TEXT
);
CREATE TABLE IF NOT EXISTS work_items (
    item_id TEXT PRIMARY KEY,
    target_id TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    severity TEXT NOT NULL DEFAULT 'unassigned',
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL DEFAULT '',
    UNIQUE (target_id, url)
);
CREATE INDEX IF NOT EXISTS work_items_by_status ON work_items (target_id, status);
";

const TARGET_COLUMNS: &str =
    "target_id, name, url, description, last_scanned, engine, document_location, image_location";
const ITEM_COLUMNS: &str = "item_id, target_id, url, status, severity, title, body, author, date";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }
}

fn conversion_error(idx: usize, err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    let engine: Option<String> = row.get(5)?;
    Ok(Target {
        target_id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        last_scanned: row.get(4)?,
        engine: engine.map(|raw| raw.parse().unwrap_or(ForumEngine::Unknown)),
        document_location: row.get(6)?,
        image_location: row.get(7)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let status: String = row.get(3)?;
    let severity: String = row.get(4)?;
    Ok(WorkItem {
        item_id: row.get(0)?,
        target_id: row.get(1)?,
        url: row.get(2)?,
        status: status.parse().map_err(|err| conversion_error(3, err))?,
        severity: severity.parse().map_err(|err| conversion_error(4, err))?,
        title: row.get(5)?,
        body: row.get(6)?,
        author: row.get(7)?,
        date: row.get(8)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_target(&self, target: &Target) -> StoreResult<()> {
        let target = target.clone();
        self.call(move |conn| {
            conn.execute(
                &format!("INSERT INTO targets ({TARGET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    target.target_id,
                    target.name,
                    target.url,
                    target.description,
                    target.last_scanned,
                    target.engine.map(ForumEngine::as_str),
                    target.document_location,
                    target.image_location,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_target(&self, target_id: &str) -> StoreResult<Option<Target>> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let target = conn
                .query_row(
                    &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE target_id = ?1"),
                    params![target_id],
                    target_from_row,
                )
                .optional()?;
            Ok(target)
        })
        .await
    }

    async fn list_targets(&self) -> StoreResult<Vec<Target>> {
        self.call(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY rowid"))?;
            let targets = stmt
                .query_map([], target_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(targets)
        })
        .await
    }

    async fn delete_target(&self, target_id: &str) -> StoreResult<bool> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let deleted = conn.execute("DELETE FROM targets WHERE target_id = ?1", params![target_id])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn record_target_fetch(
        &self,
        target_id: &str,
        scanned_at: DateTime<Utc>,
        engine: ForumEngine,
        document_location: &str,
        image_location: Option<&str>,
    ) -> StoreResult<()> {
        let target_id = target_id.to_owned();
        let document_location = document_location.to_owned();
        let image_location = image_location.map(str::to_owned);
        self.call(move |conn| {
            let updated = conn.execute(
                "UPDATE targets
                 SET last_scanned = ?2, engine = ?3, document_location = ?4, image_location = ?5
                 WHERE target_id = ?1",
                params![
                    target_id,
                    scanned_at,
                    engine.as_str(),
                    document_location,
                    image_location
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::Corrupt(format!("no target row {target_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn insert_work_items(&self, target_id: &str, urls: &[String]) -> StoreResult<usize> {
        let target_id = target_id.to_owned();
        let urls = urls.to_vec();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO work_items (item_id, target_id, url, status)
                 VALUES (?1, ?2, ?3, 'pending')",
            )?;
            let mut inserted = 0;
            for url in &urls {
                let item_id = uuid::Uuid::new_v4().to_string();
                inserted += stmt.execute(params![item_id, target_id, url])?;
            }
            Ok(inserted)
        })
        .await
    }

    async fn get_work_item(&self, item_id: &str) -> StoreResult<Option<WorkItem>> {
        let item_id = item_id.to_owned();
        self.call(move |conn| {
            let item = conn
                .query_row(
                    &format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE item_id = ?1"),
                    params![item_id],
                    item_from_row,
                )
                .optional()?;
            Ok(item)
        })
        .await
    }

    async fn list_work_items(&self, target_id: &str) -> StoreResult<Vec<WorkItem>> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM work_items WHERE target_id = ?1 ORDER BY rowid"
            ))?;
            let items = stmt
                .query_map(params![target_id], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn pending_work_items(&self, target_id: &str) -> StoreResult<Vec<WorkItem>> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM work_items
                 WHERE target_id = ?1 AND status = 'pending' ORDER BY rowid"
            ))?;
            let items = stmt
                .query_map(params![target_id], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn update_work_item_content(&self, item_id: &str, post: &PostText) -> StoreResult<()> {
        let item_id = item_id.to_owned();
        let post = post.clone();
        self.call(move |conn| {
            conn.execute(
                "UPDATE work_items SET title = ?2, body = ?3, author = ?4, date = ?5
                 WHERE item_id = ?1",
                params![item_id, post.title, post.body, post.author, post.date],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_work_item_status(&self, item_id: &str, status: WorkStatus) -> StoreResult<()> {
        let item_id = item_id.to_owned();
        self.call(move |conn| {
            conn.execute(
                "UPDATE work_items SET status = ?2 WHERE item_id = ?1",
                params![item_id, status.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_work_item_severity(
        &self,
        item_id: &str,
        severity: Severity,
    ) -> StoreResult<()> {
        let item_id = item_id.to_owned();
        self.call(move |conn| {
            conn.execute(
                "UPDATE work_items SET severity = ?2 WHERE item_id = ?1",
                params![item_id, severity.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn reset_failed(&self, target_id: &str) -> StoreResult<usize> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let reset = conn.execute(
                "UPDATE work_items SET status = 'pending'
                 WHERE target_id = ?1 AND status = 'failed'",
                params![target_id],
            )?;
            Ok(reset)
        })
        .await
    }

    async fn severity_summary(&self, target_id: &str) -> StoreResult<SeveritySummary> {
        let target_id = target_id.to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT severity, COUNT(*) FROM work_items WHERE target_id = ?1 GROUP BY severity",
            )?;
            let mut summary = SeveritySummary {
                target_id: target_id.clone(),
                ..SeveritySummary::default()
            };
            let rows = stmt.query_map(params![target_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (severity, count) = row?;
                let count = u64::try_from(count).unwrap_or_default();
                let severity: Severity = severity
                    .parse()
                    .map_err(|err: anyhow::Error| StoreError::Corrupt(format!("{err:#}")))?;
                match severity {
                    Severity::High => summary.high = count,
                    Severity::Medium => summary.medium = count,
                    Severity::Low => summary.low = count,
                    Severity::Unassigned => summary.unassigned = count,
                }
                summary.total += count;
            }
            Ok(summary)
        })
        .await
    }
}
