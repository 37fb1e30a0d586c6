//! Google Trends interest-over-time client.
//!
//! Google Trends has no public API; the web UI uses two JSON endpoints:
//!
//! 1. `GET /trends/api/explore` returns the widgets for a comparison; the
//!    `TIMESERIES` widget carries a `token` and a `request` object.
//! 2. `GET /trends/api/widgetdata/multiline` with that token and request
//!    returns `default.timelineData[].value`, one point per time bucket.
//!
//! Both bodies start with an anti-XSSI guard that is stripped before decoding.
//! Rate limiting shows up as HTTP 429.

use super::TrendSource;
use crate::errors::TrendError;
use crate::utils::{strip_xssi_prefix, truncate_for_log};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{debug, instrument};

const EXPLORE_PATH: &str = "/trends/api/explore";
const MULTILINE_PATH: &str = "/trends/api/widgetdata/multiline";
const TIMESERIES_WIDGET: &str = "TIMESERIES";

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    widgets: Vec<Widget>,
}

#[derive(Debug, Deserialize)]
struct Widget {
    id: String,
    token: Option<String>,
    request: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: Timeline,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timeline {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    #[serde(default)]
    value: Vec<f64>,
}

/// Client for the Google Trends web endpoints.
#[derive(Debug, Clone)]
pub struct GoogleTrends {
    client: Client,
    base_url: String,
    hl: String,
    tz: i32,
}

impl GoogleTrends {
    /// `client` should be the proxied client shared with the address probe.
    pub fn new(client: Client, base_url: impl Into<String>, hl: impl Into<String>, tz: i32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            hl: hl.into(),
            tz,
        }
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<String, TrendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("hl", self.hl.clone()), ("tz", self.tz.to_string())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TrendError::Status {
                status: status.as_u16(),
                body: truncate_for_log(body.trim(), 200),
            });
        }
        Ok(strip_xssi_prefix(&body).to_string())
    }

    /// Fetch the TIMESERIES widget token and request for one keyword.
    async fn explore(
        &self,
        keyword: &str,
        geo: Option<&str>,
        window: &str,
    ) -> Result<(String, Value), TrendError> {
        let req = json!({
            "comparisonItem": [{
                "keyword": keyword,
                "time": window,
                "geo": geo.unwrap_or(""),
            }],
            "category": 0,
            "property": "",
        });
        let body = self
            .get_json(EXPLORE_PATH, &[("req", req.to_string())])
            .await?;
        let explore: ExploreResponse = serde_json::from_str(&body)?;

        explore
            .widgets
            .into_iter()
            .find(|w| w.id == TIMESERIES_WIDGET)
            .and_then(|w| Some((w.token?, w.request?)))
            .ok_or(TrendError::MissingWidget)
    }
}

impl TrendSource for GoogleTrends {
    #[instrument(level = "info", skip_all, fields(%keyword, geo = ?geo, %window))]
    async fn interest_over_time(
        &self,
        keyword: &str,
        geo: Option<&str>,
        window: &str,
    ) -> Result<Vec<f64>, TrendError> {
        let t0 = Instant::now();
        let (token, request) = self.explore(keyword, geo, window).await?;

        let body = self
            .get_json(
                MULTILINE_PATH,
                &[("req", request.to_string()), ("token", token)],
            )
            .await?;
        let timeline: MultilineResponse = serde_json::from_str(&body)?;

        let series: Vec<f64> = timeline
            .default
            .timeline_data
            .iter()
            .filter_map(|p| p.value.first().copied())
            .collect();
        debug!(
            points = series.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched interest series"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EXPLORE_BODY: &str = r#")]}'
{"widgets":[
  {"id":"RELATED_TOPICS","token":"rt","request":{}},
  {"id":"TIMESERIES","token":"tok-123","request":{"time":"today 1-m","comparisonItem":[]}}
]}"#;

    const MULTILINE_BODY: &str = r#")]}',
{"default":{"timelineData":[
  {"time":"1","value":[10],"hasData":[true]},
  {"time":"2","value":[0],"hasData":[false]},
  {"time":"3","value":[35],"hasData":[true]}
]}}"#;

    fn client(server: &MockServer) -> GoogleTrends {
        GoogleTrends::new(Client::new(), server.uri(), "en-US", 360)
    }

    #[tokio::test]
    async fn test_interest_over_time_two_step() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .and(query_param("hl", "en-US"))
            .and(query_param("tz", "360"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EXPLORE_BODY))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(MULTILINE_PATH))
            .and(query_param("token", "tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MULTILINE_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let series = client(&server)
            .interest_over_time("India cement", Some("IN"), "today 1-m")
            .await
            .unwrap();
        assert_eq!(series, vec![10.0, 0.0, 35.0]);
    }

    #[tokio::test]
    async fn test_explore_request_carries_keyword_and_geo() {
        let server = MockServer::start().await;
        let req = json!({
            "comparisonItem": [{"keyword": "Oman clinker", "time": "now 7-d", "geo": "OM"}],
            "category": 0,
            "property": "",
        })
        .to_string();
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .and(query_param("req", req.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(EXPLORE_BODY))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(MULTILINE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(MULTILINE_BODY))
            .mount(&server)
            .await;

        let series = client(&server)
            .interest_over_time("Oman clinker", Some("OM"), "now 7-d")
            .await
            .unwrap();
        assert_eq!(series.len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let err = client(&server)
            .interest_over_time("India trade", None, "today 1-m")
            .await
            .unwrap_err();
        assert!(matches!(err, TrendError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_missing_timeseries_widget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(")]}'\n{\"widgets\":[]}"),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .interest_over_time("India trade", None, "today 1-m")
            .await
            .unwrap_err();
        assert!(matches!(err, TrendError::MissingWidget));
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>sorry</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .interest_over_time("India trade", None, "today 1-m")
            .await
            .unwrap_err();
        assert!(matches!(err, TrendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_timeline_is_empty_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXPLORE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(EXPLORE_BODY))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(MULTILINE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(")]}',\n{\"default\":{\"timelineData\":[]}}"),
            )
            .mount(&server)
            .await;

        let series = client(&server)
            .interest_over_time("Japan clinker", Some("JP"), "today 1-m")
            .await
            .unwrap();
        assert!(series.is_empty());
    }
}
