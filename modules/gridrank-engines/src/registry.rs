//! Registry of live engines, keyed by engine id.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::stealth::ProxyRotator;
use crate::traits::SearchEngine;

#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn SearchEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn SearchEngine>) {
        let id = engine.engine_id().to_string();
        info!(engine = %id, "Engine registered");
        self.engines.insert(id, engine);
    }

    pub fn get(&self, engine_id: &str) -> Option<Arc<dyn SearchEngine>> {
        self.engines.get(engine_id).cloned()
    }

    pub fn contains(&self, engine_id: &str) -> bool {
        self.engines.contains_key(engine_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Engines whose config names the given reputation group.
    pub fn engines_in_group(&self, group: &str) -> Vec<Arc<dyn SearchEngine>> {
        self.engines
            .values()
            .filter(|e| e.config().reputation_group.as_deref() == Some(group))
            .cloned()
            .collect()
    }

    /// Sum of `requests_today` across a reputation group — the number the
    /// provider sees from its side of the fence.
    pub fn group_requests_today(&self, group: &str) -> u32 {
        self.engines_in_group(group)
            .iter()
            .map(|e| e.requests_today())
            .sum()
    }
}

/// The default production engine set: the surfaces that extract reliably
/// over direct HTTP. `google_maps` and `bing_local` are constructible but
/// stay unregistered — their JS-rendered shells rarely yield listings.
pub fn default_engine_set(
    proxies: Arc<ProxyRotator>,
    bing_api_key: Option<String>,
) -> EngineRegistry {
    use crate::engines::{BingApiEngine, DuckDuckGoEngine, GoogleLocalFinderEngine, GoogleSearchEngine};

    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(GoogleSearchEngine::new(proxies.clone())));
    registry.register(Arc::new(GoogleLocalFinderEngine::new(proxies.clone())));
    registry.register(Arc::new(DuckDuckGoEngine::new(proxies.clone())));
    if let Some(key) = bing_api_key {
        registry.register(Arc::new(BingApiEngine::new(key, proxies)));
    } else {
        info!("BING_SEARCH_API_KEY not set — bing_api engine not registered");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_without_bing_key() {
        let registry = default_engine_set(Arc::new(ProxyRotator::new(Vec::new())), None);
        assert_eq!(
            registry.ids(),
            vec!["duckduckgo", "google_local_finder", "google_search"]
        );
    }

    #[test]
    fn default_set_with_bing_key() {
        let registry =
            default_engine_set(Arc::new(ProxyRotator::new(Vec::new())), Some("key".into()));
        assert!(registry.contains("bing_api"));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn google_group_membership() {
        let registry = default_engine_set(Arc::new(ProxyRotator::new(Vec::new())), None);
        let group = registry.engines_in_group("google");
        assert_eq!(group.len(), 2);
        assert_eq!(registry.group_requests_today("google"), 0);
    }
}
