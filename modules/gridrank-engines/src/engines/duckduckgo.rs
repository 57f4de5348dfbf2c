//! DuckDuckGo HTML endpoint engine. Organic results only — DDG has no
//! map-pack surface worth scraping. Sends no Referer.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use url::Url;

use gridrank_common::types::{GeoPoint, OrganicResult, SearchResult};

use crate::client::{EngineCore, Fetched};
use crate::config::EngineConfig;
use crate::stealth::ProxyRotator;
use crate::traits::SearchEngine;

use super::{metadata, strip_tags};

const PARSER_VERSION: &str = "ddg-html-v2";

pub struct DuckDuckGoEngine {
    core: EngineCore,
}

impl DuckDuckGoEngine {
    pub fn new(proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::duckduckgo(), proxies),
        }
    }

    fn build_url(&self, query: &str, city: Option<&str>, state: Option<&str>) -> Result<Url> {
        // DDG has no location parameter; fold the place into the query
        let q = match (city, state) {
            (Some(city), Some(state)) => format!("{query} {city} {state}"),
            (Some(city), None) => format!("{query} {city}"),
            _ => query.to_string(),
        };
        let mut url = Url::parse("https://html.duckduckgo.com/html/").context("static URL")?;
        url.query_pairs_mut().append_pair("q", &q);
        Ok(url)
    }
}

pub(crate) fn parse_results(body: &str) -> Vec<OrganicResult> {
    let link_re = regex::Regex::new(
        r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.+?)</a>"#,
    )
    .expect("static regex");
    let snippet_re =
        regex::Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.+?)</a>"#)
            .expect("static regex");

    let snippets: Vec<String> = snippet_re
        .captures_iter(body)
        .map(|cap| strip_tags(&cap[1]))
        .collect();

    link_re
        .captures_iter(body)
        .enumerate()
        .filter_map(|(i, cap)| {
            let title = strip_tags(&cap[2]);
            if title.is_empty() {
                return None;
            }
            Some(OrganicResult {
                title,
                url: cap[1].to_string(),
                snippet: snippets.get(i).cloned(),
                rank_position: i as i32 + 1,
            })
        })
        .collect()
}

#[async_trait]
impl SearchEngine for DuckDuckGoEngine {
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
                let organic_results = parse_results(&body);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_results_with_snippets() {
        let body = r#"
            <a rel="nofollow" class="result__a" href="https://joes.example.com">Joe's <b>Pizza</b></a>
            <a class="result__snippet" href="https://joes.example.com">Best slice in <b>Delray</b></a>
            <a rel="nofollow" class="result__a" href="https://petes.example.com">Pete's</a>
        "#;
        let results = parse_results(body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Joe's Pizza");
        assert_eq!(results[0].snippet.as_deref(), Some("Best slice in Delray"));
        assert_eq!(results[1].title, "Pete's");
        assert_eq!(results[1].snippet, None);
        assert_eq!(results[1].rank_position, 2);
    }

    #[test]
    fn no_referer_configured() {
        let engine = DuckDuckGoEngine::new(Arc::new(ProxyRotator::new(Vec::new())));
        assert!(engine.config().referer.is_none());
    }
}
