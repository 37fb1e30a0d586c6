//! Markdown digest of the new items, grouped by entity.
//!
//! ```text
//! # News Summary for 2025-05-06
//!
//! ## Japan
//!
//! - 2025-05-06T07:00:00Z | Port volumes rise | https://news.example/ports
//! ```

use crate::models::NewsItem;
use chrono::NaiveDate;
use itertools::Itertools;
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Render the digest. Entities are listed alphabetically; items keep their order.
pub fn render_digest(items: &[NewsItem], date: NaiveDate) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# News Summary for {date}\n");

    if items.is_empty() {
        md.push_str("No new items since the last run.\n");
        return md;
    }

    let by_entity = items.iter().into_group_map_by(|item| item.entity.as_str());
    for (entity, group) in by_entity.into_iter().sorted_by_key(|(entity, _)| *entity) {
        let _ = writeln!(md, "## {entity}\n");
        for item in group {
            let _ = writeln!(md, "- {} | {} | {}", item.published_date, item.title, item.url);
        }
        md.push('\n');
    }
    md
}

#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = items.len()))]
pub async fn write_digest(
    items: &[NewsItem],
    date: NaiveDate,
    output_dir: &Path,
    stem: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(format!("{stem}.md"));
    fs::write(&path, render_digest(items, date)).await?;
    info!(path = %path.display(), "Wrote news digest");
    Ok(path)
}
