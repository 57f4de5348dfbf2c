//! Bing Maps listing engine.
//!
//! Like Google Maps, the listing panel is rendered client-side; direct HTTP
//! yields an app shell with, at best, an embedded `taskAnswer` JSON island.
//! This engine parses that island when present and otherwise returns clean
//! empty results. Not registered by default.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use url::Url;

use gridrank_common::types::{GeoPoint, ParsedBusiness, ResultType, SearchResult};

use crate::client::{EngineCore, Fetched};
use crate::config::EngineConfig;
use crate::stealth::ProxyRotator;
use crate::traits::SearchEngine;

use super::metadata;

const PARSER_VERSION: &str = "bing-maps-shell-v1";

pub struct BingLocalEngine {
    core: EngineCore,
}

impl BingLocalEngine {
    pub fn new(proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::bing_local(), proxies),
        }
    }

    fn build_url(&self, query: &str, point: GeoPoint) -> Result<Url> {
        let mut url = Url::parse("https://www.bing.com/maps").context("static URL")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("cp", &format!("{:.7}~{:.7}", point.lat, point.lng));
            pairs.append_pair("lvl", "14");
        }
        Ok(url)
    }
}

/// Entity records inside the shell's `taskAnswer` JSON island, when Bing
/// happens to inline one.
pub(crate) fn parse_shell(body: &str) -> Vec<ParsedBusiness> {
    let island_re =
        regex::Regex::new(r#""entity":\s*(\{[^{}]*\})"#).expect("static regex");

    let mut listings = Vec::new();
    for cap in island_re.captures_iter(body) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&cap[1]) else {
            continue;
        };
        let Some(name) = value.get("title").and_then(|v| v.as_str()) else {
            continue;
        };
        let mut parsed =
            ParsedBusiness::minimal(name, ResultType::LocalPack, listings.len() as i32 + 1);
        parsed.phone = value
            .get("phone")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        parsed.website = value
            .get("website")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        listings.push(parsed);
    }
    listings
}

#[async_trait]
impl SearchEngine for BingLocalEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    async fn search(
        &self,
        query: &str,
        point: GeoPoint,
        _city: Option<&str>,
        _state: Option<&str>,
    ) -> Result<SearchResult> {
        let url = self.build_url(query, point)?;

        match self.core.execute(&url).await? {
            Fetched::Blocked {
                response_time_ms,
                proxy_used,
            } => Ok(SearchResult::empty(
                self.engine_id(),
                query,
                point,
                metadata(PARSER_VERSION, true, response_time_ms, proxy_used),
            )),
            Fetched::Ok {
                body,
                response_time_ms,
                proxy_used,
            } => {
                let businesses = parse_shell(&body);
                debug!(
                    engine = %self.engine_id(),
                    query,
                    listings = businesses.len(),
                    "Maps shell fetched"
                );
                Ok(SearchResult {
                    engine_id: self.engine_id().to_string(),
                    query: query.to_string(),
                    location: point,
                    timestamp: Utc::now(),
                    businesses,
                    organic_results: Vec::new(),
                    metadata: metadata(PARSER_VERSION, false, response_time_ms, proxy_used),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inlined_entities() {
        let body = r#"var cfg = {"taskAnswer": [{"entity": {"title": "Joe's Pizza", "phone": "(561) 555-1234", "website": "https://joes.example.com"}}]};"#;
        let listings = parse_shell(body);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "Joe's Pizza");
        assert_eq!(listings[0].phone.as_deref(), Some("(561) 555-1234"));
    }

    #[test]
    fn bare_shell_yields_nothing() {
        assert!(parse_shell("<html><body>loading…</body></html>").is_empty());
    }
}
