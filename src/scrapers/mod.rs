//! News sources queried for the ranked trends.
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | NewsAPI | [`newsapi`] | `/v2/everything` search | Requires `NEWS_API_KEY` |
//!
//! Sources return raw [`NewsItem`](crate::models::NewsItem)s; deduplication
//! against earlier runs happens later in [`crate::cache`]. A failed query is
//! logged and skipped without failing the whole fetch.

pub mod newsapi;
