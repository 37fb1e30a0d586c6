//! NewsAPI `everything` search.
//!
//! Each ranked query becomes a search for `"{phrase} AND {entity}"`, newest
//! first. Returned articles are tagged with the entity and phrase of the query
//! that found them.

use crate::config::NewsConfig;
use crate::errors::NewsError;
use crate::models::{NewsItem, Query};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    articles: Vec<Article>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    published_at: Option<String>,
    title: Option<String>,
    url: Option<String>,
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

/// Client for `GET /v2/everything`.
#[derive(Clone)]
pub struct NewsApi {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    language: String,
    sort_by: String,
}

impl std::fmt::Debug for NewsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsApi")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("language", &self.language)
            .finish()
    }
}

/// Search expression sent upstream for a query.
pub fn news_query(query: &Query) -> String {
    format!("{} AND {}", query.phrase, query.entity)
}

impl NewsApi {
    pub fn new(client: Client, config: &NewsConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: config.page_size,
            language: config.language.clone(),
            sort_by: config.sort_by.clone(),
        }
    }

    /// Fetch the latest articles for one query.
    #[instrument(level = "info", skip_all, fields(query = %query.text))]
    pub async fn fetch(&self, query: &Query) -> Result<Vec<NewsItem>, NewsError> {
        let url = format!("{}/v2/everything", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", news_query(query)),
                ("apiKey", self.api_key.clone()),
                ("sortBy", self.sort_by.clone()),
                ("language", self.language.clone()),
                ("pageSize", self.page_size.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: EverythingResponse = response.json().await?;
        if !status.is_success() || body.status != "ok" {
            return Err(NewsError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_else(|| "unknown".to_string()),
                message: body.message.unwrap_or_default(),
            });
        }

        let total = body.articles.len();
        let items: Vec<NewsItem> = body
            .articles
            .into_iter()
            .filter_map(|article| {
                let url = article.url.filter(|u| !u.trim().is_empty())?;
                Some(NewsItem {
                    published_date: article.published_at.unwrap_or_default(),
                    entity: query.entity.clone(),
                    topic: query.phrase.clone(),
                    title: article.title.unwrap_or_default(),
                    url,
                    source: article.source.and_then(|s| s.name),
                })
            })
            .collect();

        if items.len() < total {
            debug!(skipped = total - items.len(), "Skipped articles without URL");
        }
        info!(count = items.len(), "Fetched news items");
        Ok(items)
    }

    /// Fetch news for every ranked query, one after the other.
    ///
    /// # Arguments
    ///
    /// * `queries` - Ranked queries, best first
    ///
    /// # Returns
    ///
    /// All items found, grouped by query in `queries` order. A failed query is
    /// logged at `error` and contributes nothing; the other queries still run.
    #[instrument(level = "info", skip_all, fields(queries = queries.len()))]
    pub async fn fetch_all(&self, queries: &[Query]) -> Vec<NewsItem> {
        let mut items = Vec::new();
        for query in queries {
            match self.fetch(query).await {
                Ok(found) if found.is_empty() => {
                    warn!(query = %query.text, "News search returned nothing");
                }
                Ok(found) => items.extend(found),
                Err(e) => {
                    error!(query = %query.text, error = %e, "News fetch failed");
                }
            }
        }
        info!(count = items.len(), "Fetched news for ranked queries");
        items
    }
}
