//! Deterministic normalization used by entity resolution.
//!
//! All three helpers are pure and idempotent — the matcher relies on
//! `normalize_name(normalize_name(s)) == normalize_name(s)`.

/// Legal suffixes stripped from the end of business names, repeatedly.
const LEGAL_SUFFIXES: &[&str] = &[
    "llc", "inc", "corp", "corporation", "incorporated", "ltd", "limited", "co", "company", "llp",
    "pllc", "plc", "pc", "pa",
];

/// Reduce a business name to its canonical matching form: lowercase, strip
/// legal suffixes, remove non-alphanumerics, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();

    // Drop punctuation outright ("Joe's" → "joes"); only whitespace keeps
    // token boundaries.
    let cleaned: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if LEGAL_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

/// Normalize a phone number to `+<country><number>` or None when the shape
/// is not a recognizable US/NANP number.
///
/// 10 digits → `+1` + digits; 11 digits starting with 1 → `+` + digits.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}

/// Reduce a website URL to its bare registrable host: lowercase, scheme and
/// path dropped, leading `www.` stripped. None when no host can be parsed.
pub fn normalize_domain(website: &str) -> Option<String> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = url::Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("https://{trimmed}")).ok())?;

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
