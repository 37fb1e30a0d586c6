//! Small helpers shared across the pipeline.
//!
//! - String truncation for log fields
//! - Anti-XSSI prefix stripping for Google JSON endpoints
//! - HTTP client construction (direct or through the anonymizing proxy)
//! - File system validation for output and cache directories

use crate::config::HttpConfig;
use reqwest::{Client, Proxy};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Drop the anti-XSSI guard (`)]}'` or `)]}',`) Google prepends to JSON bodies.
///
/// Returns the body from its first `{` onwards, or the whole body when there
/// is no object to find.
pub fn strip_xssi_prefix(body: &str) -> &str {
    match body.find('{') {
        Some(start) => &body[start..],
        None => body.trim(),
    }
}

/// Build an HTTP client with the configured timeout and user agent.
///
/// With `proxy` set, every request goes through it and idle connections are
/// not pooled, so a request after an identity rotation opens a new circuit.
pub fn http_client(http: &HttpConfig, proxy: Option<&str>) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .timeout(http.timeout())
        .user_agent(http.user_agent.clone())
        .cookie_store(true);
    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?).pool_max_idle_per_host(0);
    }
    builder.build()
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
