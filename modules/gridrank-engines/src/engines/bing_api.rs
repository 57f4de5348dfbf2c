//! Bing Web Search API v7 engine — the one legitimate API in the set.
//!
//! No stealth: plain keyed requests, short pacing, and the counters the
//! queue needs. Location flows through the `X-Search-Location` header.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use gridrank_common::types::{
    GeoPoint, OrganicResult, ParsedBusiness, ResultType, SearchResult,
};

use crate::client::{EngineCore, REQUEST_TIMEOUT_SECS};
use crate::config::EngineConfig;
use crate::stealth::ProxyRotator;
use crate::traits::SearchEngine;

use super::metadata;

const PARSER_VERSION: &str = "bing-v7-places-v2";
const ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    #[serde(default)]
    places: Option<BingPlaces>,
    #[serde(default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingPlaces {
    #[serde(default)]
    value: Vec<BingPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingPlace {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    telephone: Option<String>,
    #[serde(default)]
    address: Option<BingAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingAddress {
    #[serde(default)]
    street_address: Option<String>,
    #[serde(default)]
    address_locality: Option<String>,
    #[serde(default)]
    address_region: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingWebPage>,
}

#[derive(Debug, Deserialize)]
struct BingWebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: Option<String>,
}

pub struct BingApiEngine {
    core: EngineCore,
    api_key: String,
    client: reqwest::Client,
}

impl BingApiEngine {
    pub fn new(api_key: String, proxies: Arc<ProxyRotator>) -> Self {
        Self {
            core: EngineCore::new(EngineConfig::bing_api(), proxies),
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn convert(response: BingResponse) -> (Vec<ParsedBusiness>, Vec<OrganicResult>) {
        let mut businesses = Vec::new();
        if let Some(places) = response.places {
            for (i, place) in places.value.into_iter().enumerate() {
                if place.name.is_empty() {
                    continue;
                }
                let mut parsed =
                    ParsedBusiness::minimal(&place.name, ResultType::LocalPack, i as i32 + 1);
                parsed.bing_place_id = place.id;
                parsed.website = place.url;
                parsed.phone = place.telephone;
                if let Some(addr) = place.address {
                    parsed.address = addr.street_address;
                    parsed.city = addr.address_locality;
                    parsed.state = addr.address_region;
                    // postal code folds into the address line when present
                    if let (Some(a), Some(zip)) = (&parsed.address, &addr.postal_code) {
                        parsed.address = Some(format!("{a}, {zip}"));
                    }
                }
                businesses.push(parsed);
            }
        }

        let organic = response
            .web_pages
            .map(|pages| {
                pages
                    .value
                    .into_iter()
                    .enumerate()
                    .filter(|(_, p)| !p.name.is_empty() && !p.url.is_empty())
                    .map(|(i, p)| OrganicResult {
                        title: p.name,
                        url: p.url,
                        snippet: p.snippet,
                        rank_position: i as i32 + 1,
                    })
                    .collect()
            })
            .unwrap_or_default();

        (businesses, organic)
    }
}

#[async_trait]
impl SearchEngine for BingApiEngine {
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
        self.core.wait_for_throttle().await;

        let location = format!("lat:{:.7};long:{:.7};re:5000", point.lat, point.lng);
        let started = Instant::now();

        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("q", query),
                ("count", "20"),
                ("mkt", "en-US"),
                ("responseFilter", "Places,Webpages"),
            ])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("X-Search-Location", location)
            .send()
            .await
            .map_err(|e| {
                self.core.record_error();
                anyhow::Error::new(e).context("Bing API request failed")
            })?;

        let status = response.status();
        if !status.is_success() {
            self.core.record_error();
            anyhow::bail!("Bing API returned HTTP {status}");
        }

        let data: BingResponse = response.json().await.map_err(|e| {
            self.core.record_error();
            anyhow::Error::new(e).context("Failed to parse Bing API response")
        })?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        self.core.record_success();

        let (businesses, organic_results) = Self::convert(data);
        info!(
            engine = %self.engine_id(),
            query,
            places = businesses.len(),
            organic = organic_results.len(),
            "Search complete"
        );

        Ok(SearchResult {
            engine_id: self.engine_id().to_string(),
            query: query.to_string(),
            location: point,
            timestamp: Utc::now(),
            businesses,
            organic_results,
            metadata: metadata(PARSER_VERSION, false, response_time_ms, false),
        })
    }
}
