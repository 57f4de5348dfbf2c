//! Shared fetch path and request/response discipline for scraping engines.
//!
//! Every concrete engine embeds an `EngineCore`. The core owns the engine's
//! throttle state, fingerprint pool, and cookie jar; the proxy rotator is
//! shared across all engines. Locks guard state math only — sleeps and HTTP
//! round-trips happen outside them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::state::{EngineState, EngineStatus};
use crate::stealth::{CookieJar, ProfilePool, ProxyRotator};

/// Per-request HTTP timeout.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Body substrings that mean the engine served a CAPTCHA interstitial.
const CAPTCHA_INDICATORS: &[&str] = &[
    "unusual traffic",
    "captcha",
    "our systems have detected",
    "sorry/index",
    "recaptcha",
];

/// True when a response body looks like a CAPTCHA or block interstitial.
pub fn is_captcha_body(body: &str) -> bool {
    let lowered = body.to_lowercase();
    CAPTCHA_INDICATORS.iter().any(|i| lowered.contains(i))
}

/// Outcome of one disciplined fetch.
pub enum Fetched {
    /// Normal response body, ready for the engine's parser.
    Ok {
        body: String,
        response_time_ms: u64,
        proxy_used: bool,
    },
    /// CAPTCHA or rate-limit interstitial; the engine is now blocked.
    Blocked {
        response_time_ms: u64,
        proxy_used: bool,
    },
}

pub struct EngineCore {
    pub config: EngineConfig,
    state: Mutex<EngineState>,
    profiles: Mutex<ProfilePool>,
    cookies: Mutex<CookieJar>,
    proxies: Arc<ProxyRotator>,
}

impl EngineCore {
    pub fn new(config: EngineConfig, proxies: Arc<ProxyRotator>) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::new(Utc::now())),
            profiles: Mutex::new(ProfilePool::new()),
            cookies: Mutex::new(CookieJar::new()),
            proxies,
        }
    }

    pub fn engine_id(&self) -> &str {
        &self.config.engine_id
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> EngineStatus {
        self.lock_state().status(Utc::now(), &self.config.throttle)
    }

    pub fn can_make_request(&self) -> bool {
        self.status() == EngineStatus::Healthy
    }

    pub fn requests_today(&self) -> u32 {
        self.lock_state().requests_today(Utc::now())
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.lock_state().blocked_until()
    }

    pub fn last_request_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_request_at()
    }

    /// Manual operator reset: block, error streak, and CAPTCHA window.
    pub fn clear_block(&self) {
        self.lock_state().clear_block();
        info!(engine = %self.config.engine_id, "Engine block cleared manually");
    }

    /// Pre-request discipline: refresh buckets, compute the humanized delay,
    /// and sleep it off without holding any lock.
    pub async fn wait_for_throttle(&self) {
        let delay_ms = self
            .lock_state()
            .next_delay_ms(Utc::now(), &self.config.throttle);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    /// Success bookkeeping; rotates the fingerprint every
    /// `SESSION_ROTATION_REQUESTS` successful requests.
    pub fn record_success(&self) {
        let rotate = self.lock_state().record_success(Utc::now());
        if rotate {
            self.rotate_profile();
            info!(engine = %self.config.engine_id, "Session fingerprint rotated");
        }
    }

    pub fn record_error(&self) -> u32 {
        self.lock_state().record_error(Utc::now())
    }

    /// Block bookkeeping for a CAPTCHA/429 event; always rotates the
    /// fingerprint.
    pub fn record_block(&self) -> DateTime<Utc> {
        let until = self
            .lock_state()
            .record_block(Utc::now(), &self.config.throttle);
        self.rotate_profile();
        warn!(
            engine = %self.config.engine_id,
            blocked_until = %until,
            "Engine blocked"
        );
        until
    }

    fn rotate_profile(&self) {
        self.profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rotate();
    }

    /// One full disciplined request: throttle sleep, stealth headers, cookie
    /// round-trip, CAPTCHA/429 detection, counter updates.
    pub async fn execute(&self, url: &Url) -> Result<Fetched> {
        self.wait_for_throttle().await;

        let proxy_url = self.proxies.next();
        let proxy_used = proxy_url.is_some();

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(p) = &proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(p).context("Invalid proxy URL")?);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let profile = self
            .profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current();
        let host = url.host_str().unwrap_or_default().to_string();

        let mut request = client
            .get(url.as_str())
            .header("User-Agent", profile.user_agent)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-User", "?1");

        if let Some(ua) = profile.sec_ch_ua {
            request = request.header("Sec-CH-UA", ua);
        }
        if let Some(platform) = profile.sec_ch_ua_platform {
            request = request.header("Sec-CH-UA-Platform", platform);
        }
        if let Some(mobile) = profile.sec_ch_ua_mobile {
            request = request.header("Sec-CH-UA-Mobile", mobile);
        }

        match &self.config.referer {
            Some(referer) => {
                request = request
                    .header("Referer", referer.as_str())
                    .header("Sec-Fetch-Site", "same-origin");
            }
            None => {
                request = request.header("Sec-Fetch-Site", "none");
            }
        }

        if let Some(cookie_header) = self
            .cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .header_for(&host)
        {
            request = request.header("Cookie", cookie_header);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                if let Some(p) = &proxy_url {
                    self.proxies.mark_failed(p);
                }
                self.record_error();
                return Err(e).context(format!("Request to {host} failed"));
            }
        };
        let http_status = response.status().as_u16();

        // Capture cookies before the body consumes the response
        {
            let mut jar = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
            for value in response.headers().get_all("set-cookie") {
                if let Ok(s) = value.to_str() {
                    jar.store(s, &host);
                }
            }
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let google_group = self.config.reputation_group.as_deref() == Some("google");
        if is_captcha_body(&body) || (http_status == 429 && google_group) {
            self.record_block();
            return Ok(Fetched::Blocked {
                response_time_ms,
                proxy_used,
            });
        }

        if http_status >= 400 {
            self.record_error();
            anyhow::bail!("HTTP {http_status} from {host}");
        }

        self.record_success();
        Ok(Fetched::Ok {
            body,
            response_time_ms,
            proxy_used,
        })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn preload_requests_today(&self, n: u32) {
        self.lock_state().preload_requests_today(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_indicators_case_insensitive() {
        assert!(is_captcha_body("Our systems have detected unusual traffic"));
        assert!(is_captcha_body("<a href=\"/sorry/index?continue=...\">"));
        assert!(is_captcha_body("please solve this reCAPTCHA"));
        assert!(!is_captcha_body("<html><body>10 results for pizza</body></html>"));
    }

    #[tokio::test]
    async fn core_state_round_trip() {
        let core = EngineCore::new(
            EngineConfig::google_search(),
            Arc::new(ProxyRotator::new(Vec::new())),
        );
        assert!(core.can_make_request());
        core.record_block();
        assert_eq!(core.status(), EngineStatus::Blocked);
        core.clear_block();
        assert!(core.can_make_request());
    }
}
