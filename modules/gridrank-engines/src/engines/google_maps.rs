//! Google Maps engine.
//!
//! The maps surface is a JS-rendered SPA shell over direct HTTP — listings
//! almost never appear in the raw response. This engine still runs the full
//! request discipline (its traffic counts against the google reputation
//! group) and parses what little the shell exposes, but callers must expect
//! empty results. It is constructible and conformant, not registered by
//! default.

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

use super::{metadata, strip_tags};

const PARSER_VERSION: &str = "google-maps-shell-v1";

pub struct GoogleMapsEngine {
    core: EngineCore,
}

impl GoogleMapsEngine {
    pub fn new(proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::google_maps(), proxies),
        }
    }

    fn build_url(&self, query: &str, point: GeoPoint) -> Result<Url> {
        let path = format!(
            "https://www.google.com/maps/search/{}/@{:.7},{:.7},14z",
            urlencode(query),
            point.lat,
            point.lng
        );
        Url::parse(&path).context("maps URL")
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Best-effort extraction from the SPA shell: the page title sometimes
/// carries a single place name when the query resolves to one entity.
pub(crate) fn parse_shell(body: &str) -> Vec<ParsedBusiness> {
    let title_re = regex::Regex::new(r"(?s)<title>(.*?)</title>").expect("static regex");
    let Some(cap) = title_re.captures(body) else {
        return Vec::new();
    };
    let title = strip_tags(&cap[1]);
    let name = title
        .strip_suffix(" - Google Maps")
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "Google Maps" {
        return Vec::new();
    }
    vec![ParsedBusiness::minimal(name, ResultType::Maps, 1)]
}

#[async_trait]
impl SearchEngine for GoogleMapsEngine {
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
