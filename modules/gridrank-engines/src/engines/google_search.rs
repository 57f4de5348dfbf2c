//! Google web search (SERP) engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use url::Url;

use gridrank_common::types::{GeoPoint, OrganicResult, SearchResult};

use crate::client::{EngineCore, Fetched};
use crate::config::EngineConfig;
use crate::stealth::{canonical_location_name, encode_uule, ProxyRotator};
use crate::traits::SearchEngine;

use super::{metadata, strip_tags};

const PARSER_VERSION: &str = "google-serp-v3";

pub struct GoogleSearchEngine {
    core: EngineCore,
}

impl GoogleSearchEngine {
    pub fn new(proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::google_search(), proxies),
        }
    }

    fn build_url(
        &self,
        query: &str,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse("https://www.google.com/search").context("static URL")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("num", "20");
            pairs.append_pair("hl", "en");
            pairs.append_pair("gl", "us");
            if let (Some(city), Some(state)) = (city, state) {
                let uule = encode_uule(&canonical_location_name(city, state));
                pairs.append_pair("uule", &uule);
            }
        }
        Ok(url)
    }
}

/// Organic results: anchor-wrapped h3 headings, in document order.
pub(crate) fn parse_organic(body: &str) -> Vec<OrganicResult> {
    let re = regex::Regex::new(r#"(?s)<a [^>]*href="(https?://[^"]+)"[^>]*>.{0,300}?<h3[^>]*>(.+?)</h3>"#)
        .expect("static regex");

    let mut results = Vec::new();
    for cap in re.captures_iter(body) {
        let url = cap[1].to_string();
        // Google's own navigation chrome also matches the shape
        if url.contains("google.com") {
            continue;
        }
        let title = strip_tags(&cap[2]);
        if title.is_empty() {
            continue;
        }
        results.push(OrganicResult {
            title,
            url,
            snippet: None,
            rank_position: results.len() as i32 + 1,
        });
    }
    results
}

#[async_trait]
impl SearchEngine for GoogleSearchEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    async fn search(
        &self,
        query: &str,
        point: GeoPoint,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<SearchResult> {
        let url = self.build_url(query, city, state)?;

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
                let organic_results = parse_organic(&body);
                info!(
                    engine = %self.engine_id(),
                    query,
                    organic = organic_results.len(),
                    "Search complete"
                );
                Ok(SearchResult {
                    engine_id: self.engine_id().to_string(),
                    query: query.to_string(),
                    location: point,
                    timestamp: Utc::now(),
                    businesses: Vec::new(),
                    organic_results,
                    metadata: metadata(PARSER_VERSION, false, response_time_ms, proxy_used),
                })
            }
        }
    }
}
