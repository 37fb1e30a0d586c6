//! Command-line interface definitions for Trend News.
//!
//! Flags override the matching `config.yaml` values; secrets are only ever
//! taken from flags or the environment.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Trend News run.
///
/// # Examples
///
/// ```sh
/// # Built-in defaults, key from the environment
/// NEWS_API_KEY=... TOR_CONTROL_PASSWORD=... trend_news -o ./out
///
/// # Custom entity list and a smaller scan
/// trend_news -c ./config.yaml -o ./out --limit 5 --max-checks 20
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory for the news exports and run report
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the dedup cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Override how many top queries are kept
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Override how many queries are scored per run
    #[arg(long)]
    pub max_checks: Option<usize>,

    /// NewsAPI key (checked at run time so a missing key still yields a run report)
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,

    /// Password for the Tor control port
    #[arg(long, env = "TOR_CONTROL_PASSWORD", hide_env_values = true, default_value = "")]
    pub tor_password: String,
}
