pub mod cpm;
pub mod mock;
pub mod serpapi;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::trends::{ RegionInterest, TrendPoint };

pub use self::cpm::{ parse_cpm_table, top_niches, CpmScraper, CpmSource, StaticCpmTable };
pub use self::mock::MockTrendsClient;
pub use self::serpapi::SerpApiTrendsClient;

pub const DEFAULT_TIMEFRAME: &str = "now 7-d";

#[derive(Debug, Error)]
pub enum TrendsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trends API error: {0}")]
    Api(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Search-interest data for a single keyword.
#[async_trait]
pub trait TrendsClient: Send + Sync {
    /// Interest over the configured timeframe, oldest sample first. Empty when there is no data.
    async fn interest_over_time(&self, keyword: &str) -> Result<Vec<TrendPoint>, TrendsError>;

    /// Interest per country, highest first.
    async fn interest_by_region(&self, keyword: &str) -> Result<Vec<RegionInterest>, TrendsError>;
}

/// Stand-in used when no trends provider is configured; every call fails with the reason.
pub struct DisabledTrendsClient {
    reason: String,
}

impl DisabledTrendsClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl TrendsClient for DisabledTrendsClient {
    async fn interest_over_time(&self, _keyword: &str) -> Result<Vec<TrendPoint>, TrendsError> {
        Err(TrendsError::NotConfigured(self.reason.clone()))
    }

    async fn interest_by_region(&self, _keyword: &str) -> Result<Vec<RegionInterest>, TrendsError> {
        Err(TrendsError::NotConfigured(self.reason.clone()))
    }
}

/// Highest interest first; ties keep the provider's order.
pub fn sort_regions_desc(regions: &mut [RegionInterest]) {
    regions.sort_by(|a, b| b.value.cmp(&a.value));
}
