//! Error taxonomy for the pipeline.
//!
//! Errors are split by how the run reacts to them:
//! - skipped: [`TrendError`] (per query), [`NewsError`] (per query)
//! - degraded: [`CacheError`] (the run continues with a stale cache)
//! - fatal: [`RotationError::Exhausted`], surfaced through [`ScoreError`]

use crate::models::NewsItem;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the identity rotation subsystem.
#[derive(Debug, Error)]
pub enum RotationError {
    /// No confirmed identity change within the retry budget. Aborts the run.
    #[error("identity rotation failed: address unchanged after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error("proxy control channel error: {0}")]
    Control(String),
    #[error("external address probe failed: {0}")]
    Probe(String),
}

/// A single failed request against the trend signal service.
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("trend service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode trend response: {0}")]
    Decode(String),
    #[error("could not build trend request: {0}")]
    Request(String),
    #[error("explore response has no TIMESERIES widget")]
    MissingWidget,
}

impl From<reqwest::Error> for TrendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            TrendError::Request(e.to_string())
        } else if e.is_decode() {
            TrendError::Decode(e.to_string())
        } else {
            TrendError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for TrendError {
    fn from(e: serde_json::Error) -> Self {
        TrendError::Decode(e.to_string())
    }
}

/// How the scorer should react to a [`TrendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rotate identity, wait, retry the same query.
    RateLimited,
    /// Log and drop the query.
    Transient,
    /// Abort the scoring pass.
    Fatal,
}

/// Errors that abort a scoring pass.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Rotation(#[from] RotationError),
    #[error("unrecoverable trend service error for {query:?}: {message}")]
    Upstream { query: String, message: String },
}

/// Failures of the news fetcher for a single query.
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("news API error (HTTP {status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

/// Low-level failures reading or writing a cache file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("deserialization error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("not a news cache file (bad magic)")]
    BadMagic,
    #[error("unsupported cache format version {0}")]
    UnsupportedVersion(u32),
    #[error("{0} trailing bytes after cache payload")]
    TrailingBytes(usize),
}

impl StoreError {
    /// True when the bytes were read but could not be understood.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Decode(_)
                | StoreError::BadMagic
                | StoreError::UnsupportedVersion(_)
                | StoreError::TrailingBytes(_)
        )
    }
}

/// Recoverable failures of the deduplication cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The active store exists but could not be read (or quarantined).
    /// Nothing was filtered; `items` is the untouched incoming batch.
    #[error("cannot read news cache at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: StoreError,
        items: Vec<NewsItem>,
    },
    /// The delta was computed but could not be written back.
    #[error("cannot persist news cache at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: StoreError,
        delta: Vec<NewsItem>,
    },
}

impl CacheError {
    /// The items the run should report when the cache is stale.
    pub fn into_items(self) -> Vec<NewsItem> {
        match self {
            CacheError::Unreadable { items, .. } => items,
            CacheError::Persist { delta, .. } => delta,
        }
    }
}
