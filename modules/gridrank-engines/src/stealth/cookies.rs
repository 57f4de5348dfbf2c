//! Minimal per-engine cookie jar.
//!
//! Stores `Set-Cookie` values with their expiry, matches by domain suffix,
//! and prunes expired entries on read. No path or SameSite handling — the
//! engines only ever revisit one host family.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `Set-Cookie` header value received from `request_domain`.
    /// Malformed values are ignored.
    pub fn store(&mut self, set_cookie: &str, request_domain: &str) {
        let mut parts = set_cookie.split(';');

        let Some((name, value)) = parts.next().and_then(|nv| nv.split_once('=')) else {
            return;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        if name.is_empty() {
            return;
        }

        let mut domain = request_domain.to_string();
        let mut expires_at: Option<DateTime<Utc>> = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
                None => continue,
            };
            match key.as_str() {
                // Max-Age wins over Expires per RFC 6265
                "max-age" => {
                    if let Ok(secs) = val.parse::<i64>() {
                        expires_at = Some(Utc::now() + Duration::seconds(secs));
                    }
                }
                "expires" if expires_at.is_none() => {
                    if let Ok(dt) = DateTime::parse_from_rfc2822(val) {
                        expires_at = Some(dt.with_timezone(&Utc));
                    }
                }
                "domain" => {
                    domain = val.trim_start_matches('.').to_ascii_lowercase();
                }
                _ => {}
            }
        }

        // Replace any prior cookie with the same name+domain
        self.cookies
            .retain(|c| !(c.name == name && c.domain == domain));
        self.cookies.push(StoredCookie {
            name,
            value,
            domain,
            expires_at,
        });
    }

    /// The `Cookie` header for a request to `domain`, or None when the jar
    /// holds nothing applicable. Expired entries are pruned first.
    pub fn header_for(&mut self, domain: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .retain(|c| c.expires_at.map(|t| t > now).unwrap_or(true));

        let domain = domain.to_ascii_lowercase();
        let matched: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| domain_matches(&domain, &c.domain))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if matched.is_empty() {
            None
        } else {
            Some(matched.join("; "))
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// `request_domain` matches a cookie domain when equal or a subdomain of it.
fn domain_matches(request_domain: &str, cookie_domain: &str) -> bool {
    request_domain == cookie_domain || request_domain.ends_with(&format!(".{cookie_domain}"))
}
