//! The engine contract the scan pipeline depends on.

use anyhow::Result;
use async_trait::async_trait;

use gridrank_common::types::{GeoPoint, SearchResult};

use crate::client::EngineCore;
use crate::config::EngineConfig;
use crate::state::EngineStatus;

/// One search source. Concrete engines embed an [`EngineCore`] and get the
/// lifecycle surface for free; `search` is the only method they must write.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// The shared base every engine is built on.
    fn core(&self) -> &EngineCore;

    /// Run one query at one grid point. The pre-request throttle sleep
    /// happens inside this call; a CAPTCHA comes back as an empty result
    /// with `metadata.captcha_detected` set, never as an error.
    async fn search(
        &self,
        query: &str,
        point: GeoPoint,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<SearchResult>;

    fn engine_id(&self) -> &str {
        self.core().engine_id()
    }

    fn config(&self) -> &EngineConfig {
        &self.core().config
    }

    /// Derived health: blocked → throttled → healthy.
    fn status(&self) -> EngineStatus {
        self.core().status()
    }

    fn can_make_request(&self) -> bool {
        self.core().can_make_request()
    }

    fn requests_today(&self) -> u32 {
        self.core().requests_today()
    }

    /// Operator reset of block state, error streak, and CAPTCHA history.
    fn clear_block(&self) {
        self.core().clear_block()
    }
}
