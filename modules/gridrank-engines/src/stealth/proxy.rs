//! Round-robin proxy rotator shared by every engine.
//!
//! A proxy that fails a request (for any engine) sits out a 30-minute
//! cooldown. SOCKS URLs are rejected at load time — the fetch path only
//! speaks http/https proxies.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

const FAILURE_COOLDOWN_MINUTES: i64 = 30;

#[derive(Debug, Default)]
struct RotatorInner {
    proxies: Vec<String>,
    next: usize,
    cooldown_until: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ProxyRotator {
    inner: Mutex<RotatorInner>,
}

impl ProxyRotator {
    /// Build from pre-split proxy URLs (see `Config::proxy_list`).
    pub fn new(proxies: Vec<String>) -> Self {
        let accepted: Vec<String> = proxies
            .into_iter()
            .filter(|p| {
                if p.starts_with("socks") {
                    warn!(proxy = %p, "SOCKS proxies are not supported, skipping");
                    false
                } else {
                    true
                }
            })
            .collect();

        if !accepted.is_empty() {
            info!(count = accepted.len(), "Proxy rotator loaded");
        }

        Self {
            inner: Mutex::new(RotatorInner {
                proxies: accepted,
                ..Default::default()
            }),
        }
    }

    /// Next usable proxy URL, round-robin, skipping cooled-down entries.
    /// None when no proxies are configured or all are cooling down.
    pub fn next(&self) -> Option<String> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.proxies.is_empty() {
            return None;
        }

        let now = Utc::now();
        let count = inner.proxies.len();
        for _ in 0..count {
            let idx = inner.next % count;
            inner.next = inner.next.wrapping_add(1);
            let candidate = inner.proxies[idx].clone();
            let cooling = inner
                .cooldown_until
                .get(&candidate)
                .map(|t| *t > now)
                .unwrap_or(false);
            if !cooling {
                return Some(candidate);
            }
        }
        None
    }

    /// Record a request failure through `proxy_url`; it sits out 30 minutes.
    pub fn mark_failed(&self, proxy_url: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let until = Utc::now() + Duration::minutes(FAILURE_COOLDOWN_MINUTES);
        inner.cooldown_until.insert(proxy_url.to_string(), until);
        warn!(proxy = %proxy_url, "Proxy entered failure cooldown");
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .proxies
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles() {
        let rotator = ProxyRotator::new(vec!["http://a".into(), "http://b".into()]);
        assert_eq!(rotator.next().as_deref(), Some("http://a"));
        assert_eq!(rotator.next().as_deref(), Some("http://b"));
        assert_eq!(rotator.next().as_deref(), Some("http://a"));
    }

    #[test]
    fn failed_proxy_skipped() {
        let rotator = ProxyRotator::new(vec!["http://a".into(), "http://b".into()]);
        rotator.mark_failed("http://a");
        assert_eq!(rotator.next().as_deref(), Some("http://b"));
        assert_eq!(rotator.next().as_deref(), Some("http://b"));
    }

    #[test]
    fn all_failed_yields_none() {
        let rotator = ProxyRotator::new(vec!["http://a".into()]);
        rotator.mark_failed("http://a");
        assert_eq!(rotator.next(), None);
    }

    #[test]
    fn empty_rotator() {
        let rotator = ProxyRotator::new(Vec::new());
        assert!(rotator.is_empty());
        assert_eq!(rotator.next(), None);
    }

    #[test]
    fn socks_rejected_at_load() {
        let rotator = ProxyRotator::new(vec!["socks5://a:1080".into(), "http://b".into()]);
        assert_eq!(rotator.next().as_deref(), Some("http://b"));
        assert_eq!(rotator.next().as_deref(), Some("http://b"));
    }
}
