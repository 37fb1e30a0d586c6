//! # Trend News
//!
//! Finds which entity/topic queries are currently trending, fetches recent
//! news for the best ones, and reports only the items not seen in earlier
//! runs.
//!
//! ## Usage
//!
//! ```sh
//! NEWS_API_KEY=... TOR_CONTROL_PASSWORD=... trend_news -c config.yaml -o ./out
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Queries**: Cross every entity with its topic phrases, shuffled
//! 2. **Scoring**: Rank queries by trend interest through the Tor proxy,
//!    rotating the exit identity between batches and on rate limits
//! 3. **Fetching**: Pull recent articles for the ranked queries from NewsAPI
//! 4. **Dedup**: Keep only items missing from the quarter-partitioned cache
//! 5. **Output**: Write the JSON export, the Markdown digest and the run report
//!
//! A fatal error anywhere still writes `run_report.json` with `status: failed`.

use chrono::{DateTime, Local};
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod backoff;
mod cache;
mod cli;
mod config;
mod errors;
mod identity;
mod models;
mod outputs;
mod queries;
mod scrapers;
mod trends;
mod utils;

use backoff::SystemClock;
use cache::DedupCache;
use cli::Cli;
use config::AppConfig;
use identity::IdentityRotator;
use identity::probe::HttpAddressProbe;
use identity::tor::TorController;
use outputs::report::{self, RunReport};
use outputs::{export_stem, json, markdown};
use queries::generate_queries;
use scrapers::newsapi::NewsApi;
use trends::google::GoogleTrends;
use trends::{GeoLookup, ScorerSettings, StatusClassifier, TrendScorer};
use utils::{ensure_writable_dir, http_client};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let started_at = Local::now();
    info!("trend_news starting up");

    let args = Cli::parse();
    debug!(output_dir = %args.output_dir.display(), config = ?args.config, "Parsed CLI arguments");

    // Early check: without a writable output dir not even a failure report can be written
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    match run(&args, started_at).await {
        Ok(report) => {
            report::write_report(&report, &args.output_dir).await?;
            let elapsed = start_time.elapsed();
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                ranked = report.ranked_queries.len(),
                new_items = report.new_items,
                cache_stale = report.cache_stale,
                "Execution complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            let report = RunReport::started(started_at).failed(Local::now(), e.to_string());
            if let Err(write_err) = report::write_report(&report, &args.output_dir).await {
                error!(error = %write_err, "Failed to write failure report");
            }
            Err(e)
        }
    }
}

/// Apply CLI overrides on top of the loaded file.
fn apply_overrides(mut config: AppConfig, args: &Cli) -> AppConfig {
    if let Some(limit) = args.limit {
        config.scoring.limit = limit;
    }
    if let Some(max_checks) = args.max_checks {
        config.scoring.max_checks = max_checks;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
    config
}

/// The NewsAPI key, or an error that ends the run with a failed report.
fn news_api_key(args: &Cli) -> Result<String, Box<dyn Error>> {
    match args.news_api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err("NEWS_API_KEY is not set (pass --news-api-key or export it)".into()),
    }
}

#[instrument(level = "info", skip_all)]
async fn run(args: &Cli, started_at: DateTime<Local>) -> Result<RunReport, Box<dyn Error>> {
    let config = apply_overrides(AppConfig::load(args.config.as_deref()).await?, args);
    let api_key = news_api_key(args)?;

    let queries = generate_queries(&config.entities);
    if queries.is_empty() {
        return Err("no queries to score: the entity/phrase mapping is empty".into());
    }
    info!(count = queries.len(), "Generated candidate queries");

    if let Err(e) = ensure_writable_dir(&config.cache.dir).await {
        warn!(path = %config.cache.dir.display(), error = %e, "Cache directory is not writable; dedup will be stale");
    }

    // ---- Score through the proxy ----
    let proxied = http_client(&config.http, Some(config.identity.socks_proxy.as_str()))?;
    let rotator = IdentityRotator::new(
        TorController::new(
            &config.identity.control_addr,
            &args.tor_password,
            config.identity.control_timeout(),
        ),
        HttpAddressProbe::new(proxied.clone(), &config.identity.ip_check_url),
        SystemClock,
        config.identity.settle(),
        config.identity.retry_policy(),
    );
    let scorer = TrendScorer::new(
        GoogleTrends::new(
            proxied,
            &config.scoring.base_url,
            &config.scoring.hl,
            config.scoring.tz,
        ),
        StatusClassifier::new(config.scoring.rate_limit_statuses.clone()),
        rotator,
        SystemClock,
        GeoLookup::new(&config.geo_codes),
        ScorerSettings {
            time_window: config.scoring.time_window.clone(),
            rotate_every: config.scoring.rotate_every,
            pacing: config.scoring.pacing(),
            rate_limit: config.scoring.rate_limit_policy(),
        },
    );
    let ranked = scorer
        .rank(&queries, config.scoring.limit, config.scoring.max_checks)
        .await?;
    if ranked.is_empty() {
        warn!("No query showed any trend signal");
    }

    // ---- Fetch news directly; NewsAPI does not need the proxy ----
    let news = NewsApi::new(
        http_client(&config.http, None)?,
        &config.news,
        api_key,
    );
    let fetched = news.fetch_all(&ranked).await;

    let mut cache = DedupCache::new(config.cache.dir.clone(), config.cache.lookup_window, SystemClock);
    let (fresh, cache_stale) = match cache.filter_and_update(fetched).await {
        Ok(delta) => (delta, false),
        Err(e) => {
            warn!(error = %e, "Dedup cache unavailable; reporting possibly repeated items");
            (e.into_items(), true)
        }
    };

    // ---- Outputs ----
    let stem = export_stem(&started_at);
    let json_path = json::write_items(&fresh, &args.output_dir, &stem).await?;
    let md_path =
        markdown::write_digest(&fresh, started_at.date_naive(), &args.output_dir, &stem).await?;

    let mut report = RunReport::started(started_at).with_ranked(&ranked);
    report.new_items = fresh.len();
    report.cache_stale = cache_stale;
    report.exports = [json_path, md_path]
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    Ok(report.completed(Local::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides_replace_config_values() {
        let args = Cli::parse_from([
            "trend_news",
            "--news-api-key",
            "k",
            "--limit",
            "3",
            "--cache-dir",
            "/tmp/cache",
        ]);
        let config = apply_overrides(AppConfig::default(), &args);
        assert_eq!(config.scoring.limit, 3);
        assert_eq!(config.scoring.max_checks, AppConfig::default().scoring.max_checks);
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_blank_news_api_key_is_a_run_error() {
        let args = Cli::parse_from(["trend_news", "--news-api-key", "  "]);
        let err = news_api_key(&args).unwrap_err();
        assert!(err.to_string().contains("NEWS_API_KEY"));

        let args = Cli::parse_from(["trend_news", "--news-api-key", " k1 "]);
        assert_eq!(news_api_key(&args).unwrap(), "k1");
    }

    #[tokio::test]
    async fn test_missing_key_fails_run_before_any_network_call() {
        let args = Cli::parse_from(["trend_news", "--news-api-key", ""]);
        let err = run(&args, Local::now()).await.unwrap_err();
        assert!(err.to_string().contains("NEWS_API_KEY"));
    }
}
