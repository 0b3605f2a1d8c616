use async_trait::async_trait;
use log::{ info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client as HttpClient;

use super::TrendsError;
use crate::models::trends::NicheCpm;

pub const DEFAULT_CPM_URL: &str = "https://www.tubebuddy.com/blog/profitable-youtube-niches/";
const CPM_MARKER: &str = "CPM of";

static LIST_ITEM_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("list item pattern"));
static LIST_ITEM_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</li\s*>|</?(?:ul|ol)\b").expect("list item end pattern")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$?\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("number pattern")
});

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#36;", "$")
        .replace("&#8211;", "-")
        .replace("&ndash;", "-")
        .replace("&#8217;", "'")
        .replace("&rsquo;", "'")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Inner HTML of every `<li>`. An item ends at its `</li>`, at the next `<li>`,
/// or where a list opens or closes, so unclosed items and the text of an item
/// that holds a nested list are both kept.
fn list_items(html: &str) -> Vec<&str> {
    let starts: Vec<_> = LIST_ITEM_START.find_iter(html).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let until = starts.get(i + 1).map_or(html.len(), |next| next.start());
            let segment = &html[start.end()..until];
            match LIST_ITEM_END.find(segment) {
                Some(end) => &segment[..end.start()],
                None => segment,
            }
        })
        .collect()
}

fn item_text(inner_html: &str) -> String {
    let stripped = TAG.replace_all(inner_html, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn parse_cpm_value(raw: &str) -> Option<f64> {
    let caps = LEADING_NUMBER.captures(raw.trim())?;
    caps[1].replace(',', "").parse().ok()
}

/// Pulls `"<niche> CPM of $<value>"` list items out of a page.
///
/// Items are returned in page order. A niche that appears twice keeps its first
/// position and its last value.
pub fn parse_cpm_table(html: &str) -> Vec<NicheCpm> {
    let mut table: Vec<NicheCpm> = Vec::new();
    for item in list_items(html) {
        let text = item_text(item);
        let Some((niche, value)) = text.split_once(CPM_MARKER) else {
            continue;
        };
        let niche = niche.trim().trim_end_matches(|c: char| matches!(c, ':' | '-' | ',')).trim();
        let Some(cpm) = parse_cpm_value(value) else {
            warn!("Skipping CPM entry without a number: '{}'", text);
            continue;
        };
        match table.iter_mut().find(|entry| entry.niche == niche) {
            Some(existing) => existing.cpm = cpm,
            None => table.push(NicheCpm { niche: niche.to_string(), cpm }),
        }
    }
    table
}

/// The `n` best-paying niches, highest CPM first.
pub fn top_niches(table: &[NicheCpm], n: usize) -> Vec<NicheCpm> {
    let mut sorted = table.to_vec();
    sorted.sort_by(|a, b| b.cpm.total_cmp(&a.cpm));
    sorted.truncate(n);
    sorted
}

/// Where the niche CPM table comes from.
#[async_trait]
pub trait CpmSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NicheCpm>, TrendsError>;
}

/// A fixed table, for offline runs and tests.
pub struct StaticCpmTable(pub Vec<NicheCpm>);

#[async_trait]
impl CpmSource for StaticCpmTable {
    async fn fetch(&self) -> Result<Vec<NicheCpm>, TrendsError> {
        Ok(self.0.clone())
    }
}

pub struct CpmScraper {
    http: HttpClient,
    url: String,
}

impl CpmScraper {
    pub fn new(url: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            url: url.unwrap_or_else(|| DEFAULT_CPM_URL.to_string()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CpmSource for CpmScraper {
    /// Downloads the page fresh on every call.
    async fn fetch(&self) -> Result<Vec<NicheCpm>, TrendsError> {
        let resp = self.http.get(&self.url).send().await?.error_for_status()?;
        let html = resp.text().await?;
        let table = parse_cpm_table(&html);
        info!("Parsed {} CPM entries from {}", table.len(), self.url);
        Ok(table)
    }
}
