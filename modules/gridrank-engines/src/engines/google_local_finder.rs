//! Google Local Finder (`tbm=lcl`) engine — the 20-result map-anchored
//! listing surface, and the richest business source we scrape.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use url::Url;

use gridrank_common::types::{GeoPoint, ParsedBusiness, ResultType, SearchResult};

use crate::client::{EngineCore, Fetched};
use crate::config::EngineConfig;
use crate::stealth::{canonical_location_name, encode_uule, ProxyRotator};
use crate::traits::SearchEngine;

use super::{metadata, strip_tags};

const PARSER_VERSION: &str = "google-lcl-v2";

pub struct GoogleLocalFinderEngine {
    core: EngineCore,
}

impl GoogleLocalFinderEngine {
    pub fn new(proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::google_local_finder(), proxies),
        }
    }

    fn build_url(
        &self,
        query: &str,
        point: GeoPoint,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse("https://www.google.com/search").context("static URL")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("tbm", "lcl");
            pairs.append_pair("num", "20");
            pairs.append_pair("hl", "en");
            if let (Some(city), Some(state)) = (city, state) {
                let uule = encode_uule(&canonical_location_name(city, state));
                pairs.append_pair("uule", &uule);
            } else {
                // Fall back to a viewport hint when no named location exists
                pairs.append_pair("near", &format!("{:.4},{:.4}", point.lat, point.lng));
            }
        }
        Ok(url)
    }
}

/// Listing blocks in the rendered local-finder page. Names sit in
/// `div.dbg0pd` headings; ratings and review counts in the `Y0A0hc` cluster
/// next to them.
pub(crate) fn parse_listings(body: &str) -> Vec<ParsedBusiness> {
    let name_re =
        regex::Regex::new(r#"(?s)<div class="dbg0pd"[^>]*>\s*(?:<span[^>]*>)?(.+?)</div>"#)
            .expect("static regex");
    let rating_re =
        regex::Regex::new(r#"(?s)aria-hidden="true">([0-9.]+)</span>.{0,200}?\(([0-9,]+)\)"#)
            .expect("static regex");

    // Collect the heading matches first, then read each listing's rating out
    // of the slice between it and the next heading.
    let matches: Vec<(usize, String)> = name_re
        .captures_iter(body)
        .filter_map(|cap| {
            let name = strip_tags(&cap[1]);
            let end = cap.get(0).map(|m| m.end())?;
            if name.is_empty() {
                None
            } else {
                Some((end, name))
            }
        })
        .collect();

    let mut listings = Vec::new();
    for (i, (segment_start, name)) in matches.iter().enumerate() {
        let segment_end = matches
            .get(i + 1)
            .map(|(next_end, _)| *next_end)
            .unwrap_or(body.len());
        let segment = &body[*segment_start..segment_end.max(*segment_start)];

        let mut parsed =
            ParsedBusiness::minimal(name, ResultType::LocalFinder, listings.len() as i32 + 1);
        if let Some(rc) = rating_re.captures(segment) {
            parsed.rating = rc[1].parse().ok();
            parsed.review_count = rc[2].replace(',', "").parse().ok();
        }
        listings.push(parsed);
    }
    listings
}

#[async_trait]
impl SearchEngine for GoogleLocalFinderEngine {
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
        let url = self.build_url(query, point, city, state)?;

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
                let businesses = parse_listings(&body);
                info!(
                    engine = %self.engine_id(),
                    query,
                    listings = businesses.len(),
                    "Search complete"
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
    fn parses_listing_names_ratings_and_counts() {
        let body = r#"
            <div class="dbg0pd" role="heading"><span class="OSrXXb">Joe's Pizza</span></div>
            <span class="Y0A0hc"><span class="yi40Hd" aria-hidden="true">4.7</span>
            <span class="RDApEe">(1,208)</span></span>
            <div class="dbg0pd" role="heading"><span class="OSrXXb">Pete's</span></div>
            <div class="rllt__details">no rating block here</div>
        "#;
        let listings = parse_listings(body);
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].name, "Joe's Pizza");
        assert_eq!(listings[0].rating, Some(4.7));
        assert_eq!(listings[0].review_count, Some(1208));
        assert_eq!(listings[0].rank_position, 1);
        assert_eq!(listings[0].result_type, ResultType::LocalFinder);
        assert_eq!(listings[1].name, "Pete's");
        assert_eq!(listings[1].rating, None);
        assert_eq!(listings[1].rank_position, 2);
    }

    #[test]
    fn empty_page_parses_to_nothing() {
        assert!(parse_listings("<html><body></body></html>").is_empty());
    }
}
