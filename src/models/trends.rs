use serde::{ Deserialize, Serialize };

/// One sample of search interest over time (0-100 scale).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub timestamp: Option<i64>,
    pub value: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionInterest {
    pub geo_name: String,
    pub geo_code: Option<String>,
    pub value: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NicheCpm {
    pub niche: String,
    pub cpm: f64,
}

/// Dashboard page result. Fetch failures land in `warnings`, never in an `Err`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrendReport {
    pub keyword: String,
    pub timeline: Option<Vec<TrendPoint>>,
    pub regions: Option<Vec<RegionInterest>>,
    pub warnings: Vec<String>,
}
