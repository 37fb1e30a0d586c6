//! Data models shared by the scoring, fetching and caching stages.
//!
//! - [`Query`]: one entity/phrase candidate produced by the query generator
//! - [`Score`]: a query together with its measured interest
//! - [`NewsItem`]: a raw news hit for a ranked query
//! - [`CacheEntry`]: the persisted form of a [`NewsItem`]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A candidate search query built from an entity and a topic phrase.
///
/// Two queries are the same query when their `(entity, phrase)` pair matches;
/// `text` is always `"{entity} {phrase}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// The full search text sent upstream.
    pub text: String,
    /// The geographic or organizational unit the query is scoped to.
    pub entity: String,
    /// The topic fragment.
    pub phrase: String,
}

impl Query {
    pub fn new(entity: &str, phrase: &str) -> Self {
        Self {
            text: format!("{entity} {phrase}"),
            entity: entity.to_string(),
            phrase: phrase.to_string(),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Mean interest measured for a query over the configured time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub query: Query,
    /// Arithmetic mean of the interest series; always `>= 0`.
    pub value: f64,
}

/// A news hit returned for a ranked query.
///
/// `url` is the identity key used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Publication timestamp as reported upstream (ISO-8601, date first).
    pub published_date: String,
    /// Entity of the query that surfaced this item.
    pub entity: String,
    /// Phrase of the query that surfaced this item.
    pub topic: String,
    pub title: String,
    pub url: String,
    /// Outlet name, when the upstream reports one.
    #[serde(default)]
    pub source: Option<String>,
}

impl NewsItem {
    /// The calendar date of publication, if `published_date` can be parsed.
    pub fn published_on(&self) -> Option<NaiveDate> {
        parse_published_date(&self.published_date)
    }
}

/// Persisted form of a [`NewsItem`].
///
/// Kept as its own type so the on-disk schema can evolve independently of
/// the in-memory model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub published_date: String,
    pub entity: String,
    pub topic: String,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
}

impl CacheEntry {
    pub fn published_on(&self) -> Option<NaiveDate> {
        parse_published_date(&self.published_date)
    }
}

impl From<NewsItem> for CacheEntry {
    fn from(item: NewsItem) -> Self {
        Self {
            published_date: item.published_date,
            entity: item.entity,
            topic: item.topic,
            title: item.title,
            url: item.url,
            source: item.source,
        }
    }
}

/// Parse the date part of an upstream timestamp.
///
/// Accepts a bare `YYYY-MM-DD` or any string starting with one
/// (`2025-05-06T14:30:00Z`, `2025-05-06 14:30`). Anything else yields `None`.
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10)?;
    let date = NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()?;
    match raw.as_bytes().get(10) {
        None | Some(b'T') | Some(b't') | Some(b' ') => Some(date),
        Some(_) => None,
    }
}
