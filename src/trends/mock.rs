use async_trait::async_trait;
use std::sync::atomic::{ AtomicUsize, Ordering };

use super::{ TrendsClient, TrendsError };
use crate::models::trends::{ RegionInterest, TrendPoint };

/// Canned trends data. `None` makes the matching call fail.
pub struct MockTrendsClient {
    timeline: Option<Vec<TrendPoint>>,
    regions: Option<Vec<RegionInterest>>,
    calls: AtomicUsize,
}

impl MockTrendsClient {
    pub fn new(timeline: Option<Vec<TrendPoint>>, regions: Option<Vec<RegionInterest>>) -> Self {
        Self { timeline, regions, calls: AtomicUsize::new(0) }
    }

    pub fn sample() -> Self {
        let timeline = (1..=3)
            .map(|day| TrendPoint {
                date: format!("Oct {}, 2026", day),
                timestamp: None,
                value: day * 20,
            })
            .collect();
        let regions = vec![
            RegionInterest { geo_name: "United States".into(), geo_code: Some("US".into()), value: 100 },
            RegionInterest { geo_name: "India".into(), geo_code: Some("IN".into()), value: 64 }
        ];
        Self::new(Some(timeline), Some(regions))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendsClient for MockTrendsClient {
    async fn interest_over_time(&self, _keyword: &str) -> Result<Vec<TrendPoint>, TrendsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeline.clone().ok_or_else(|| TrendsError::Api("trends unavailable".into()))
    }

    async fn interest_by_region(&self, _keyword: &str) -> Result<Vec<RegionInterest>, TrendsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.regions.clone().ok_or_else(|| TrendsError::Api("regions unavailable".into()))
    }
}
