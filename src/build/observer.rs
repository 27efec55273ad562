//! Step observability
//!
//! The builder reports every step to a [`StepObserver`]. Executed steps are
//! reported before their handler runs; cached steps after the hit is applied.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// How a step was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Cached,
    Executed,
}

/// One observed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub verb: String,
    pub args: Vec<String>,
    pub outcome: StepOutcome,
}

impl fmt::Display for StepRecord {
    /// Verb name followed by its space-joined arguments
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.verb)
        } else {
            write!(f, "{} {}", self.verb, self.args.join(" "))
        }
    }
}

/// Sink for step records
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn record(&self, record: &StepRecord);
}

/// Logs steps through `tracing`
pub struct TracingObserver;

#[async_trait]
impl StepObserver for TracingObserver {
    async fn record(&self, record: &StepRecord) {
        match record.outcome {
            StepOutcome::Executed => info!("+++ Execute: {}", record),
            StepOutcome::Cached => info!("+++ Cached: {}", record),
        }
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<StepRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StepRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Records of steps that actually ran
    pub fn executed(&self) -> Vec<StepRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.outcome == StepOutcome::Executed)
            .collect()
    }
}

#[async_trait]
impl StepObserver for RecordingObserver {
    async fn record(&self, record: &StepRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Appends JSON lines to a journal file
///
/// Silently drops records on IO failure; the journal never fails a build.
pub struct JournalObserver {
    path: PathBuf,
}

impl JournalObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StepObserver for JournalObserver {
    async fn record(&self, record: &StepRecord) {
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "verb": record.verb,
            "args": record.args,
            "outcome": record.outcome,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal record: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }
}

/// Fans records out to several observers
pub struct MultiObserver(pub Vec<std::sync::Arc<dyn StepObserver>>);

#[async_trait]
impl StepObserver for MultiObserver {
    async fn record(&self, record: &StepRecord) {
        for observer in &self.0 {
            observer.record(record).await;
        }
    }
}
