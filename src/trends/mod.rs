//! Trend scoring.
//!
//! For each candidate query the scorer fetches an interest series, scores it
//! by its mean, and keeps the best `limit` queries. The upstream rate-limits
//! aggressively, so requests are paced, the egress identity is rotated every
//! few queries, and a rate-limited query is retried after a rotation.
//!
//! # Architecture
//!
//! - [`TrendSource`]: fetches an interest series ([`google::GoogleTrends`])
//! - [`ErrorClassifier`]: maps a [`TrendError`] to an [`ErrorClass`]
//! - [`GeoLookup`]: resolves a region filter from the query text
//! - [`TrendScorer`]: the scoring pass
//!
//! # Failure semantics
//!
//! Per-query failures drop the query. Only identity rotation exhaustion (and a
//! [`ErrorClass::Fatal`] classification) aborts the pass; an empty ranking is a
//! valid outcome.

pub mod google;

use crate::backoff::{Clock, DelayRange, RetryPolicy};
use crate::errors::{ErrorClass, ScoreError, TrendError};
use crate::identity::IdentityRotation;
use crate::models::{Query, Score};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// An upstream that reports relative interest over time for a keyword.
pub trait TrendSource {
    async fn interest_over_time(
        &self,
        keyword: &str,
        geo: Option<&str>,
        window: &str,
    ) -> Result<Vec<f64>, TrendError>;
}

/// Decides how the scorer reacts to an upstream error.
pub trait ErrorClassifier {
    fn classify(&self, err: &TrendError) -> ErrorClass;
}

/// Classifies by HTTP status: listed statuses are rate limits, a request that
/// could not even be built is fatal, everything else is transient.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    rate_limit_statuses: Vec<u16>,
}

impl StatusClassifier {
    pub fn new(rate_limit_statuses: Vec<u16>) -> Self {
        Self {
            rate_limit_statuses,
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(vec![429])
    }
}

impl ErrorClassifier for StatusClassifier {
    fn classify(&self, err: &TrendError) -> ErrorClass {
        match err {
            TrendError::Status { status, .. } if self.rate_limit_statuses.contains(status) => {
                ErrorClass::RateLimited
            }
            TrendError::Request(_) => ErrorClass::Fatal,
            _ => ErrorClass::Transient,
        }
    }
}

/// Region codes keyed by entity name, matched against the start of a query.
#[derive(Debug, Clone, Default)]
pub struct GeoLookup {
    /// Lowercased entity name and code, longest name first.
    entries: Vec<(String, String)>,
}

impl GeoLookup {
    pub fn new(codes: &BTreeMap<String, String>) -> Self {
        let mut entries: Vec<(String, String)> = codes
            .iter()
            .map(|(name, code)| (name.trim().to_lowercase(), code.trim().to_string()))
            .filter(|(name, code)| !name.is_empty() && !code.is_empty())
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Region code for the entity the query text starts with, if any.
    ///
    /// Matching is case-insensitive and must end on a word boundary, so
    /// `"India cement"` matches `India` but `"Indiana steel"` does not.
    pub fn resolve(&self, query_text: &str) -> Option<&str> {
        let lower = query_text.trim_start().to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| {
                lower.starts_with(name.as_str())
                    && lower[name.len()..]
                        .chars()
                        .next()
                        .is_none_or(char::is_whitespace)
            })
            .map(|(_, code)| code.as_str())
    }
}

/// Knobs of one scoring pass.
#[derive(Debug, Clone)]
pub struct ScorerSettings {
    /// Time window passed upstream, e.g. `"today 1-m"`.
    pub time_window: String,
    /// Rotate identity after every this many processed queries (0 disables).
    pub rotate_every: usize,
    /// Delay between two consecutive queries.
    pub pacing: DelayRange,
    /// Per-query retries after a rate limit, and the wait before each.
    pub rate_limit: RetryPolicy,
}

/// Mean of an interest series; `None` when there is no signal at all.
pub fn mean_interest(series: &[f64]) -> Option<f64> {
    if series.is_empty() || series.iter().all(|v| *v == 0.0) {
        return None;
    }
    Some(series.iter().sum::<f64>() / series.len() as f64)
}

/// Sort descending by value and keep the first `limit`.
///
/// The sort is stable: equal scores keep their input order.
pub fn rank_scores(mut scores: Vec<Score>, limit: usize) -> Vec<Score> {
    scores.sort_by(|a, b| b.value.total_cmp(&a.value));
    scores.truncate(limit);
    scores
}

pub struct TrendScorer<S, K, R, C> {
    source: S,
    classifier: K,
    rotator: R,
    clock: C,
    geo: GeoLookup,
    settings: ScorerSettings,
}

impl<S, K, R, C> std::fmt::Debug for TrendScorer<S, K, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendScorer")
            .field("geo", &self.geo)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<S, K, R, C> TrendScorer<S, K, R, C>
where
    S: TrendSource,
    K: ErrorClassifier,
    R: IdentityRotation,
    C: Clock,
{
    pub fn new(
        source: S,
        classifier: K,
        rotator: R,
        clock: C,
        geo: GeoLookup,
        settings: ScorerSettings,
    ) -> Self {
        Self {
            source,
            classifier,
            rotator,
            clock,
            geo,
            settings,
        }
    }

    /// Rank the first `max_checks` queries and return the top `limit`.
    ///
    /// # Arguments
    ///
    /// * `queries` - Candidates in scan order (normally already shuffled)
    /// * `limit` - How many of the best queries to keep
    /// * `max_checks` - How many candidates to score at most
    ///
    /// # Returns
    ///
    /// Queries ordered by descending mean interest. Queries that had no signal
    /// or were dropped after upstream errors are absent, so the result may be
    /// shorter than `limit` or empty.
    ///
    /// # Errors
    ///
    /// - [`ScoreError::Rotation`] when a proactive or rate-limit rotation
    ///   could not confirm a new identity
    /// - [`ScoreError::Upstream`] when an error is classified as fatal
    pub async fn rank(
        &self,
        queries: &[Query],
        limit: usize,
        max_checks: usize,
    ) -> Result<Vec<Query>, ScoreError> {
        let scores = self.score_all(queries, max_checks).await?;
        Ok(rank_scores(scores, limit)
            .into_iter()
            .map(|s| s.query)
            .collect())
    }

    /// Score the first `max_checks` queries in input order.
    ///
    /// Queries without signal are absent from the result.
    #[instrument(level = "info", skip_all, fields(candidates = queries.len(), max_checks))]
    pub async fn score_all(
        &self,
        queries: &[Query],
        max_checks: usize,
    ) -> Result<Vec<Score>, ScoreError> {
        let t0 = Instant::now();
        let batch = &queries[..queries.len().min(max_checks)];
        let mut scores = Vec::with_capacity(batch.len());

        for (i, query) in batch.iter().enumerate() {
            if let Some(score) = self.score_one(query).await? {
                scores.push(score);
            }

            let processed = i + 1;
            if processed == batch.len() {
                break;
            }
            let every = self.settings.rotate_every;
            if every > 0 && processed % every == 0 {
                info!(processed, "Proactive identity rotation");
                self.rotator.rotate().await?;
            }
            self.clock.sleep(self.settings.pacing.sample()).await;
        }

        info!(
            processed = batch.len(),
            scored = scores.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Scoring pass complete"
        );
        Ok(scores)
    }

    #[instrument(level = "info", skip_all, fields(query = %query.text))]
    async fn score_one(&self, query: &Query) -> Result<Option<Score>, ScoreError> {
        let geo = self.geo.resolve(&query.text);
        let policy = &self.settings.rate_limit;
        let mut retries = 0usize;

        loop {
            let result = self
                .source
                .interest_over_time(&query.text, geo, &self.settings.time_window)
                .await;

            let err = match result {
                Ok(series) => {
                    let score = mean_interest(&series).map(|value| Score {
                        query: query.clone(),
                        value,
                    });
                    match &score {
                        Some(s) => debug!(geo = ?geo, points = series.len(), value = s.value, "Scored query"),
                        None => debug!(geo = ?geo, points = series.len(), "No interest signal; excluded"),
                    }
                    return Ok(score);
                }
                Err(e) => e,
            };

            match self.classifier.classify(&err) {
                ErrorClass::RateLimited => {
                    retries += 1;
                    if retries > policy.max_attempts {
                        warn!(retries = policy.max_attempts, error = %err, "Rate limit retries exhausted; dropping query");
                        return Ok(None);
                    }
                    warn!(retry = retries, max = policy.max_attempts, error = %err, "Rate limited; rotating identity");
                    self.rotator.rotate().await?;
                    self.clock.sleep(policy.delay_for(retries)).await;
                }
                ErrorClass::Transient => {
                    warn!(geo = ?geo, error = %err, "Trend request failed; dropping query");
                    return Ok(None);
                }
                ErrorClass::Fatal => {
                    error!(error = %err, "Unrecoverable trend service error");
                    return Err(ScoreError::Upstream {
                        query: query.text.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
