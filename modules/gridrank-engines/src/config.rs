//! Immutable per-engine configuration.

/// Request pacing and budget limits for one engine.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub jitter_ms: u64,
    pub backoff_on_error: bool,
    /// Ceiling (and no-history default) for a CAPTCHA pause, in hours.
    pub pause_on_captcha_hours: u32,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub engine_id: String,
    /// Engines sharing a provider-side reputation, e.g. all Google surfaces.
    pub reputation_group: Option<String>,
    pub throttle: ThrottleConfig,
    /// Paid/official APIs skip the stealth discipline entirely.
    pub is_legitimate_api: bool,
    pub requires_api_key: bool,
    /// Referer header sent with every request, when the engine wants one.
    pub referer: Option<String>,
}

impl EngineConfig {
    pub fn google_search() -> Self {
        Self {
            engine_id: "google_search".to_string(),
            reputation_group: Some("google".to_string()),
            throttle: ThrottleConfig {
                min_delay_ms: 8_000,
                max_delay_ms: 20_000,
                max_per_hour: 30,
                max_per_day: 120,
                jitter_ms: 3_000,
                backoff_on_error: true,
                pause_on_captcha_hours: 24,
            },
            is_legitimate_api: false,
            requires_api_key: false,
            referer: Some("https://www.google.com/".to_string()),
        }
    }

    pub fn google_local_finder() -> Self {
        Self {
            engine_id: "google_local_finder".to_string(),
            reputation_group: Some("google".to_string()),
            throttle: ThrottleConfig {
                min_delay_ms: 10_000,
                max_delay_ms: 25_000,
                max_per_hour: 20,
                max_per_day: 80,
                jitter_ms: 4_000,
                backoff_on_error: true,
                pause_on_captcha_hours: 24,
            },
            is_legitimate_api: false,
            requires_api_key: false,
            referer: Some("https://www.google.com/".to_string()),
        }
    }

    pub fn google_maps() -> Self {
        Self {
            engine_id: "google_maps".to_string(),
            reputation_group: Some("google".to_string()),
            throttle: ThrottleConfig {
                min_delay_ms: 12_000,
                max_delay_ms: 30_000,
                max_per_hour: 15,
                max_per_day: 60,
                jitter_ms: 5_000,
                backoff_on_error: true,
                pause_on_captcha_hours: 24,
            },
            is_legitimate_api: false,
            requires_api_key: false,
            referer: Some("https://www.google.com/".to_string()),
        }
    }

    pub fn bing_api() -> Self {
        Self {
            engine_id: "bing_api".to_string(),
            reputation_group: None,
            throttle: ThrottleConfig {
                min_delay_ms: 150,
                max_delay_ms: 400,
                max_per_hour: 1_000,
                max_per_day: 3_000,
                jitter_ms: 0,
                backoff_on_error: true,
                pause_on_captcha_hours: 1,
            },
            is_legitimate_api: true,
            requires_api_key: true,
            referer: None,
        }
    }

    pub fn bing_local() -> Self {
        Self {
            engine_id: "bing_local".to_string(),
            reputation_group: Some("bing".to_string()),
            throttle: ThrottleConfig {
                min_delay_ms: 6_000,
                max_delay_ms: 15_000,
                max_per_hour: 40,
                max_per_day: 150,
                jitter_ms: 2_500,
                backoff_on_error: true,
                pause_on_captcha_hours: 12,
            },
            is_legitimate_api: false,
            requires_api_key: false,
            referer: Some("https://www.bing.com/".to_string()),
        }
    }

    pub fn duckduckgo() -> Self {
        Self {
            engine_id: "duckduckgo".to_string(),
            reputation_group: None,
            throttle: ThrottleConfig {
                min_delay_ms: 4_000,
                max_delay_ms: 10_000,
                max_per_hour: 60,
                max_per_day: 300,
                jitter_ms: 2_000,
                backoff_on_error: true,
                pause_on_captcha_hours: 6,
            },
            is_legitimate_api: false,
            requires_api_key: false,
            // DuckDuckGo gets no Referer
            referer: None,
        }
    }
}
