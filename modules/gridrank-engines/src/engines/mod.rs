//! Concrete engines, one per source. Each pairs the shared [`EngineCore`]
//! discipline with its own URL shape and parser.

mod bing_api;
mod bing_local;
mod duckduckgo;
mod google_local_finder;
mod google_maps;
mod google_search;

pub use bing_api::BingApiEngine;
pub use bing_local::BingLocalEngine;
pub use duckduckgo::DuckDuckGoEngine;
pub use google_local_finder::GoogleLocalFinderEngine;
pub use google_maps::GoogleMapsEngine;
pub use google_search::GoogleSearchEngine;

use gridrank_common::types::SearchMetadata;

/// Strip markup and decode the handful of entities search pages actually use.
pub(crate) fn strip_tags(html: &str) -> String {
    let re = regex::Regex::new(r"<[^>]+>").expect("static regex");
    let text = re.replace_all(html, "");
    text.replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

pub(crate) fn metadata(
    parser_version: &str,
    captcha_detected: bool,
    response_time_ms: u64,
    proxy_used: bool,
) -> SearchMetadata {
    SearchMetadata {
        captcha_detected,
        response_time_ms,
        parser_version: parser_version.to_string(),
        proxy_used,
    }
}
