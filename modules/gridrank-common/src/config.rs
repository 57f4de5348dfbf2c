use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Engine API keys (optional — engines requiring a key stay unregistered
    // when theirs is absent)
    pub bing_search_api_key: Option<String>,
    pub google_places_api_key: Option<String>,

    // Scanning
    pub default_grid_size: u32,

    // Proxies: PROXY_LIST takes precedence over PROXY_FILE
    pub proxy_list: Vec<String>,

    // Web server (consumed by the enclosing application, not the core)
    pub log_level: String,
    pub cors_origin: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            bing_search_api_key: non_empty(env::var("BING_SEARCH_API_KEY").ok()),
            google_places_api_key: non_empty(env::var("GOOGLE_PLACES_API_KEY").ok()),
            default_grid_size: env::var("DEFAULT_GRID_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            proxy_list: load_proxy_list(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string()),
        }
    }

    /// Log the presence of each sensitive env var without exposing its value.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", Some(self.database_url.as_str())),
            ("BING_SEARCH_API_KEY", self.bing_search_api_key.as_deref()),
            ("GOOGLE_PLACES_API_KEY", self.google_places_api_key.as_deref()),
        ];
        for (name, value) in vars {
            match value {
                Some(v) if !v.is_empty() => tracing::info!("{name} = ({} chars)", v.len()),
                _ => tracing::info!("{name} = (empty)"),
            }
        }
        tracing::info!(
            proxies = self.proxy_list.len(),
            default_grid_size = self.default_grid_size,
            "Config loaded"
        );
    }
}

/// Proxy URLs from PROXY_LIST (comma-separated) or PROXY_FILE (one per line,
/// `#` comments skipped). PROXY_LIST wins when both are set.
fn load_proxy_list() -> Vec<String> {
    if let Ok(list) = env::var("PROXY_LIST") {
        return split_proxies(&list, ',');
    }
    if let Ok(path) = env::var("PROXY_FILE") {
        match std::fs::read_to_string(&path) {
            Ok(contents) => return split_proxies(&contents, '\n'),
            Err(e) => {
                tracing::warn!(path, error = %e, "Failed to read PROXY_FILE");
            }
        }
    }
    Vec::new()
}

fn split_proxies(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .collect()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_skips_comments_and_blanks() {
        let proxies = split_proxies("http://p1:8080\n# comment\n\nhttp://p2:8080\n", '\n');
        assert_eq!(proxies, vec!["http://p1:8080", "http://p2:8080"]);
    }

    #[test]
    fn split_handles_comma_list() {
        let proxies = split_proxies("http://a, http://b,", ',');
        assert_eq!(proxies, vec!["http://a", "http://b"]);
    }
}
