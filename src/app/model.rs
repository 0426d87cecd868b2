use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ForumEngine;

/// A registered forum being monitored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub target_id: String,
    pub name: String,
    pub url: String,
    pub description: String,

    pub last_scanned: Option<DateTime<Utc>>,
    pub engine: Option<ForumEngine>,

    pub document_location: Option<String>,
    pub image_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Scraped,
    Failed,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkStatus {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "scraped" => Ok(Self::Scraped),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unknown work item status: {other}"),
        }
    }
}

/// Severity tiers in priority order; the first matching tier wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
    Unassigned,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unassigned => "unassigned",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "unassigned" => Ok(Self::Unassigned),
            other => anyhow::bail!("unknown severity tier: {other}"),
        }
    }
}

/// One discovered thread with its own fetch/extract/classify lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub item_id: String,
    pub target_id: String,
    pub url: String,
    pub status: WorkStatus,
    pub title: String,
    pub body: String,
    pub author: String,
    pub date: String,
    pub severity: Severity,
}

/// Structured content pulled out of one thread page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostText {
    pub title: String,
    pub body: String,
    pub author: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeveritySummary {
    pub target_id: String,
    pub total: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub unassigned: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    Aborted { reason: String },
}

/// What one scheduling pass did, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassReport {
    pub target_id: String,
    pub outcome: PassOutcome,
    pub batch_sizes: Vec<usize>,
    pub scraped: usize,
    pub failed: usize,
}

impl PassReport {
    pub fn aborted(target_id: &str, reason: impl Into<String>) -> Self {
        Self {
            target_id: target_id.to_owned(),
            outcome: PassOutcome::Aborted {
                reason: reason.into(),
            },
            batch_sizes: Vec::new(),
            scraped: 0,
            failed: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == PassOutcome::Completed
    }
}
