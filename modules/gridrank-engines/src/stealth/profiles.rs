//! Rotating browser fingerprint pool.
//!
//! Each profile keeps its user agent and client-hint headers internally
//! consistent — a Chrome UA always ships Chrome's `Sec-CH-UA` set, and
//! Firefox profiles carry no client hints at all (Firefox does not send
//! them). Profiles rotate after a run of successful requests and on every
//! CAPTCHA event.

use rand::Rng;

/// One internally consistent browser fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub user_agent: &'static str,
    pub sec_ch_ua: Option<&'static str>,
    pub sec_ch_ua_platform: Option<&'static str>,
    pub sec_ch_ua_mobile: Option<&'static str>,
}

/// Chrome, Edge, and Firefox across Windows, macOS, and Linux.
pub(crate) const PROFILES: &[BrowserProfile] = &[
    // Chrome 131 / Windows
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Chrome 130 / Windows
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Chromium\";v=\"130\", \"Google Chrome\";v=\"130\", \"Not?A_Brand\";v=\"99\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Chrome 131 / macOS
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"macOS\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Chrome 130 / Linux
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Chromium\";v=\"130\", \"Google Chrome\";v=\"130\", \"Not?A_Brand\";v=\"99\""),
        sec_ch_ua_platform: Some("\"Linux\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Edge 131 / Windows
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        sec_ch_ua: Some("\"Microsoft Edge\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Edge 130 / macOS
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
        sec_ch_ua: Some("\"Microsoft Edge\";v=\"130\", \"Chromium\";v=\"130\", \"Not?A_Brand\";v=\"99\""),
        sec_ch_ua_platform: Some("\"macOS\""),
        sec_ch_ua_mobile: Some("?0"),
    },
    // Firefox 133 / Windows — no client hints
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        sec_ch_ua_mobile: None,
    },
    // Firefox 132 / macOS — no client hints
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:132.0) Gecko/20100101 Firefox/132.0",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        sec_ch_ua_mobile: None,
    },
    // Firefox 133 / Linux — no client hints
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        sec_ch_ua_mobile: None,
    },
    // Chrome 129 / Windows
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Google Chrome\";v=\"129\", \"Not=A?Brand\";v=\"8\", \"Chromium\";v=\"129\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        sec_ch_ua_mobile: Some("?0"),
    },
];

/// Pool handing out one profile at a time, rotating on demand.
#[derive(Debug)]
pub struct ProfilePool {
    current: usize,
}

impl ProfilePool {
    /// Start on a uniformly random profile.
    pub fn new() -> Self {
        Self {
            current: rand::rng().random_range(0..PROFILES.len()),
        }
    }

    pub fn current(&self) -> BrowserProfile {
        PROFILES[self.current]
    }

    /// Switch to a different profile than the current one.
    pub fn rotate(&mut self) {
        let mut rng = rand::rng();
        loop {
            let next = rng.random_range(0..PROFILES.len());
            if next != self.current {
                self.current = next;
                return;
            }
        }
    }
}

impl Default for ProfilePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_has_at_least_nine_profiles() {
        assert!(PROFILES.len() >= 9);
    }

    #[test]
    fn firefox_profiles_omit_client_hints() {
        for p in PROFILES {
            if p.user_agent.contains("Firefox") {
                assert!(p.sec_ch_ua.is_none());
                assert!(p.sec_ch_ua_platform.is_none());
                assert!(p.sec_ch_ua_mobile.is_none());
            } else {
                assert!(p.sec_ch_ua.is_some());
                assert!(p.sec_ch_ua_platform.is_some());
                assert!(p.sec_ch_ua_mobile.is_some());
            }
        }
    }

    #[test]
    fn chromium_hints_match_ua_version() {
        for p in PROFILES {
            if let Some(hints) = p.sec_ch_ua {
                let major = p
                    .user_agent
                    .split("Chrome/")
                    .nth(1)
                    .and_then(|v| v.split('.').next())
                    .expect("chromium UA without Chrome/ token");
                assert!(hints.contains(major), "hint/UA mismatch: {hints} vs {major}");
            }
        }
    }

    #[test]
    fn rotate_always_changes_profile() {
        let mut pool = ProfilePool::new();
        for _ in 0..50 {
            let before = pool.current;
            pool.rotate();
            assert_ne!(before, pool.current);
        }
    }
}
