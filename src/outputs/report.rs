//! Run report.
//!
//! Written at the end of every run, successful or not, so a fatal abort can
//! never be mistaken for a quiet day with no trends.

use crate::models::Query;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const REPORT_FILE: &str = "run_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Ranked queries, best first. Empty when scoring did not finish.
    pub ranked_queries: Vec<String>,
    pub new_items: usize,
    /// The dedup cache could not be read or saved; `new_items` may repeat
    /// earlier runs.
    pub cache_stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// File names of the exports written for this run.
    pub exports: Vec<String>,
}

impl RunReport {
    pub fn started(at: DateTime<Local>) -> Self {
        Self {
            status: RunStatus::Completed,
            started_at: at,
            finished_at: at,
            ranked_queries: Vec::new(),
            new_items: 0,
            cache_stale: false,
            error: None,
            exports: Vec::new(),
        }
    }

    pub fn with_ranked(mut self, ranked: &[Query]) -> Self {
        self.ranked_queries = ranked.iter().map(|q| q.text.clone()).collect();
        self
    }

    pub fn completed(mut self, at: DateTime<Local>) -> Self {
        self.status = RunStatus::Completed;
        self.finished_at = at;
        self
    }

    pub fn failed(mut self, at: DateTime<Local>, error: impl ToString) -> Self {
        self.status = RunStatus::Failed;
        self.finished_at = at;
        self.error = Some(error.to_string());
        self
    }
}

/// Overwrite `{output_dir}/run_report.json` with `report`.
///
/// Called on both the success and the failure path; the previous run's report
/// is replaced.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), status = ?report.status))]
pub async fn write_report(report: &RunReport, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(REPORT_FILE);
    fs::write(&path, serde_json::to_string_pretty(report)?).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}
