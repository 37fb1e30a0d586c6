//! Run artifacts written to the output directory.
//!
//! - [`json`]: the new items of this run, as a timestamped JSON export
//! - [`markdown`]: a human-readable digest of the same items
//! - [`report`]: the run report; the only artifact written on failure
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── news_2025-05-06_08-30.json
//! ├── news_2025-05-06_08-30.md
//! └── run_report.json
//! ```

pub mod json;
pub mod markdown;
pub mod report;

use chrono::{DateTime, Local};

/// File stem shared by the JSON and Markdown exports of one run.
pub fn export_stem(at: &DateTime<Local>) -> String {
    format!("news_{}", at.format("%Y-%m-%d_%H-%M"))
}
