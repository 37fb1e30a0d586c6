//! JSON export of the items that are new in this run.

use crate::models::NewsItem;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `items` to `{output_dir}/{stem}.json` and return the path.
///
/// # Arguments
///
/// * `items` - The items that are new in this run
/// * `output_dir` - Created if missing
/// * `stem` - File stem from [`export_stem`](super::export_stem)
///
/// # Returns
///
/// The written path. An empty run still produces a file holding `[]`.
///
/// # Errors
///
/// Serialization, directory creation or the write itself.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = items.len()))]
pub async fn write_items(
    items: &[NewsItem],
    output_dir: &Path,
    stem: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(items)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = output_dir.join(format!("{stem}.json"));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote news export");
    Ok(path)
}
