use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::{ sort_regions_desc, TrendsClient, TrendsError, DEFAULT_TIMEFRAME };
use crate::models::trends::{ RegionInterest, TrendPoint };

pub const SERPAPI_BASE_URL: &str = "https://serpapi.com";

const NO_RESULTS_MARKER: &str = "hasn't returned any results";

/// Google Trends through SerpAPI's `google_trends` engine.
pub struct SerpApiTrendsClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    timeframe: String,
    geo: String,
}

#[derive(Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelineEntry>,
}

#[derive(Deserialize)]
struct TimelineEntry {
    date: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    values: Vec<QueryValue>,
}

#[derive(Deserialize)]
struct QueryValue {
    #[serde(default)]
    extracted_value: Option<f64>,
    #[serde(default)]
    value: Option<String>,
}

impl QueryValue {
    fn score(&self) -> u32 {
        let raw = self.extracted_value.or_else(|| {
            self.value
                .as_deref()
                .map(|v| v.trim_start_matches('<').trim())
                .and_then(|v| v.parse().ok())
        });
        raw.map(|v: f64| v.round().clamp(0.0, u32::MAX as f64) as u32).unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct GeoMapResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    interest_by_region: Vec<RegionEntry>,
}

#[derive(Deserialize)]
struct RegionEntry {
    location: String,
    #[serde(default)]
    geo: Option<String>,
    #[serde(default)]
    values: Vec<QueryValue>,
}

fn timeline_from(resp: TimeseriesResponse) -> Result<Vec<TrendPoint>, TrendsError> {
    if let Some(error) = resp.error {
        if error.contains(NO_RESULTS_MARKER) {
            return Ok(Vec::new());
        }
        return Err(TrendsError::Api(error));
    }
    let entries = resp.interest_over_time.map(|i| i.timeline_data).unwrap_or_default();
    Ok(
        entries
            .into_iter()
            .map(|entry| TrendPoint {
                value: entry.values.first().map(QueryValue::score).unwrap_or(0),
                timestamp: entry.timestamp.as_deref().and_then(|t| t.parse().ok()),
                date: entry.date,
            })
            .collect()
    )
}

fn regions_from(resp: GeoMapResponse) -> Result<Vec<RegionInterest>, TrendsError> {
    if let Some(error) = resp.error {
        if error.contains(NO_RESULTS_MARKER) {
            return Ok(Vec::new());
        }
        return Err(TrendsError::Api(error));
    }
    let mut regions: Vec<RegionInterest> = resp.interest_by_region
        .into_iter()
        .map(|entry| RegionInterest {
            value: entry.values.first().map(QueryValue::score).unwrap_or(0),
            geo_name: entry.location,
            geo_code: entry.geo,
        })
        .collect();
    sort_regions_desc(&mut regions);
    Ok(regions)
}

impl SerpApiTrendsClient {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        timeframe: Option<String>,
        geo: Option<String>
    ) -> Result<Self, TrendsError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TrendsError::NotConfigured("SERPAPI_API_KEY is required".to_string()))?;
        let base_url = base_url.unwrap_or_else(|| SERPAPI_BASE_URL.to_string());

        Ok(Self {
            http: HttpClient::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeframe: timeframe.unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
            geo: geo.unwrap_or_default(),
        })
    }

    async fn search<T: for<'de> Deserialize<'de>>(
        &self,
        keyword: &str,
        data_type: &str
    ) -> Result<T, TrendsError> {
        let url = format!("{}/search.json", self.base_url);
        let mut query = vec![
            ("engine", "google_trends"),
            ("q", keyword),
            ("date", self.timeframe.as_str()),
            ("data_type", data_type),
            ("api_key", self.api_key.as_str())
        ];
        if !self.geo.is_empty() {
            query.push(("geo", self.geo.as_str()));
        }
        if data_type == "GEO_MAP_0" {
            query.push(("region", "COUNTRY"));
        }

        debug!("Trends request: {} data_type={} q='{}'", url, data_type, keyword);
        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = serde_json
                ::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(TrendsError::Api(format!("{} ({})", message, status)));
        }
        serde_json::from_str(&body).map_err(|e| TrendsError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TrendsClient for SerpApiTrendsClient {
    async fn interest_over_time(&self, keyword: &str) -> Result<Vec<TrendPoint>, TrendsError> {
        let resp: TimeseriesResponse = self.search(keyword, "TIMESERIES").await?;
        let timeline = timeline_from(resp)?;
        info!("Fetched {} trend points for '{}'", timeline.len(), keyword);
        Ok(timeline)
    }

    async fn interest_by_region(&self, keyword: &str) -> Result<Vec<RegionInterest>, TrendsError> {
        let resp: GeoMapResponse = self.search(keyword, "GEO_MAP_0").await?;
        let regions = regions_from(resp)?;
        info!("Fetched {} regions for '{}'", regions.len(), keyword);
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{ extract::Query, routing::get, Json, Router };
    use serde_json::{ json, Value };
    use std::collections::HashMap;

    async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(params["engine"], "google_trends");
        assert_eq!(params["date"], "now 7-d");
        assert_eq!(params["api_key"], "serp-key");
        if params["q"] == "nothing" {
            return Json(json!({ "error": "Google Trends hasn't returned any results for this query." }));
        }
        match params["data_type"].as_str() {
            "TIMESERIES" =>
                Json(
                    json!({
                    "interest_over_time": { "timeline_data": [
                        { "date": "Oct 9, 2026", "timestamp": "1791504000", "values": [{ "query": "rust", "value": "40", "extracted_value": 40 }] },
                        { "date": "Oct 10, 2026", "timestamp": "1791590400", "values": [{ "query": "rust", "value": "<1" }] }
                    ]}
                })
                ),
            _ => {
                assert_eq!(params["region"], "COUNTRY");
                Json(
                    json!({
                    "interest_by_region": [
                        { "geo": "DE", "location": "Germany", "values": [{ "value": "55", "extracted_value": 55 }] },
                        { "geo": "US", "location": "United States", "values": [{ "value": "100", "extracted_value": 100 }] },
                        { "geo": "FR", "location": "France", "values": [{ "value": "0", "extracted_value": 0 }] }
                    ]
                })
                )
            }
        }
    }

    async fn client() -> SerpApiTrendsClient {
        let app = Router::new().route("/search.json", get(search));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        SerpApiTrendsClient::new(
            Some("serp-key".into()),
            Some(format!("http://{}", addr)),
            None,
            None
        ).unwrap()
    }

    #[tokio::test]
    async fn parses_timeline() {
        let timeline = client().await.interest_over_time("rust").await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].value, 40);
        assert_eq!(timeline[0].timestamp, Some(1791504000));
        assert_eq!(timeline[1].value, 1);
    }

    #[tokio::test]
    async fn regions_come_back_highest_first() {
        let regions = client().await.interest_by_region("rust").await.unwrap();
        let names: Vec<_> = regions.iter().map(|r| r.geo_name.as_str()).collect();
        assert_eq!(names, vec!["United States", "Germany", "France"]);
        assert_eq!(regions[0].geo_code.as_deref(), Some("US"));
    }

    #[tokio::test]
    async fn no_results_is_empty_not_error() {
        let c = client().await;
        assert!(c.interest_over_time("nothing").await.unwrap().is_empty());
        assert!(c.interest_by_region("nothing").await.unwrap().is_empty());
    }

    #[test]
    fn other_api_errors_surface() {
        let resp = TimeseriesResponse {
            error: Some("Invalid API key.".into()),
            interest_over_time: None,
        };
        assert!(matches!(timeline_from(resp), Err(TrendsError::Api(m)) if m == "Invalid API key."));
    }

    #[test]
    fn missing_key_is_not_configured() {
        assert!(matches!(
            SerpApiTrendsClient::new(None, None, None, None),
            Err(TrendsError::NotConfigured(_))
        ));
    }
}
