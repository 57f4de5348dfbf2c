// Test doubles for the scan pipeline.
//
// Two mocks matching the two external boundaries:
// - MemoryStore — one stateful in-memory implementation of CatalogStore,
//   BusinessStore, and ScanStore
// - StubEngine (SearchEngine) — canned results, optional failure mode
//
// Plus seed helpers for ServiceArea / Category / ScanSchedule rows.
// No network, no database; `cargo test` in seconds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gridrank_common::normalize::normalize_domain;
use gridrank_common::types::{
    Business, Category, GeoPoint, Keyword, ParsedBusiness, ResultType, ReviewSnapshot,
    ReviewSource, Scan, ScanPoint, ScanPointStatus, ScanRanking, ScanSchedule, ScanStatus,
    SearchMetadata, SearchResult, ServiceArea,
};
use gridrank_engines::client::EngineCore;
use gridrank_engines::config::{EngineConfig, ThrottleConfig};
use gridrank_engines::stealth::ProxyRotator;
use gridrank_engines::SearchEngine;

use crate::grid::GridCell;
use crate::traits::{
    BusinessMerge, BusinessStore, CatalogStore, NewBusiness, NewRanking, NewScan, ScanStore,
};

// ---------------------------------------------------------------------------
// Seed helpers
// ---------------------------------------------------------------------------

/// Delray Beach, FL test area (1 mile radius).
pub fn service_area(name: &str) -> ServiceArea {
    ServiceArea {
        id: Uuid::new_v4(),
        name: name.to_string(),
        state: "Florida".to_string(),
        center_lat: 26.4615,
        center_lng: -80.0728,
        radius_miles: 1.0,
        is_active: true,
    }
}

pub fn category(name: &str) -> Category {
    Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        parent_id: None,
        is_active: true,
    }
}

pub fn keyword(category_id: Uuid, text: &str) -> Keyword {
    Keyword {
        id: Uuid::new_v4(),
        category_id,
        text: text.to_string(),
        priority: 1,
        is_active: true,
    }
}

pub fn schedule(
    name: &str,
    cron: &str,
    area_ids: Vec<Uuid>,
    category_ids: Vec<Uuid>,
    engine_ids: Vec<String>,
) -> ScanSchedule {
    ScanSchedule {
        id: Uuid::new_v4(),
        name: name.to_string(),
        cron_expression: cron.to_string(),
        service_area_ids: area_ids,
        category_ids,
        engine_ids,
        grid_size: 3,
        is_active: true,
        last_run_at: None,
        next_run_at: None,
    }
}

/// A listing shaped like the ones local-pack parsers produce.
pub fn listing(name: &str, rank_position: i32) -> ParsedBusiness {
    ParsedBusiness::minimal(name, ResultType::LocalPack, rank_position)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    areas: HashMap<Uuid, ServiceArea>,
    categories: HashMap<Uuid, Category>,
    keywords: Vec<Keyword>,
    schedules: HashMap<Uuid, ScanSchedule>,
    businesses: HashMap<Uuid, Business>,
    scans: HashMap<Uuid, Scan>,
    points: HashMap<Uuid, ScanPoint>,
    rankings: Vec<ScanRanking>,
    snapshots: Vec<ReviewSnapshot>,
}

/// In-memory store honoring the same semantics as the Postgres layer,
/// including atomic point-counter increments and guarded terminal
/// transitions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- seeding ---

    pub fn add_service_area(&self, area: ServiceArea) -> Uuid {
        let id = area.id;
        self.lock().areas.insert(id, area);
        id
    }

    pub fn add_category(&self, category: Category) -> Uuid {
        let id = category.id;
        self.lock().categories.insert(id, category);
        id
    }

    pub fn add_keyword(&self, keyword: Keyword) {
        self.lock().keywords.push(keyword);
    }

    pub fn add_schedule(&self, schedule: ScanSchedule) -> Uuid {
        let id = schedule.id;
        self.lock().schedules.insert(id, schedule);
        id
    }

    /// Seed a pre-existing scan row (for recovery tests).
    pub fn add_scan(&self, scan: Scan) {
        self.lock().scans.insert(scan.id, scan);
    }

    pub fn add_point(&self, point: ScanPoint) {
        self.lock().points.insert(point.id, point);
    }

    // --- inspection ---

    pub fn scan(&self, id: Uuid) -> Option<Scan> {
        self.lock().scans.get(&id).cloned()
    }

    pub fn rankings_for_scan(&self, scan_id: Uuid) -> Vec<ScanRanking> {
        let inner = self.lock();
        let point_ids: Vec<Uuid> = inner
            .points
            .values()
            .filter(|p| p.scan_id == scan_id)
            .map(|p| p.id)
            .collect();
        inner
            .rankings
            .iter()
            .filter(|r| point_ids.contains(&r.scan_point_id))
            .cloned()
            .collect()
    }

    pub fn business_count(&self) -> usize {
        self.lock().businesses.len()
    }

    pub fn businesses(&self) -> Vec<Business> {
        self.lock().businesses.values().cloned().collect()
    }

    pub fn snapshots_for(&self, business_id: Uuid) -> Vec<ReviewSnapshot> {
        self.lock()
            .snapshots
            .iter()
            .filter(|s| s.business_id == business_id)
            .cloned()
            .collect()
    }

    pub fn points_for_scan(&self, scan_id: Uuid) -> Vec<ScanPoint> {
        self.lock()
            .points
            .values()
            .filter(|p| p.scan_id == scan_id)
            .cloned()
            .collect()
    }

    pub fn schedule_row(&self, id: Uuid) -> Option<ScanSchedule> {
        self.lock().schedules.get(&id).cloned()
    }

    pub fn scan_count(&self) -> usize {
        self.lock().scans.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_service_area(&self, id: Uuid) -> Result<Option<ServiceArea>> {
        Ok(self.lock().areas.get(&id).cloned())
    }

    async fn list_active_service_areas(&self) -> Result<Vec<ServiceArea>> {
        Ok(self
            .lock()
            .areas
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.lock().categories.get(&id).cloned())
    }

    async fn list_active_categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .lock()
            .categories
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn list_active_keywords(&self, category_id: Uuid) -> Result<Vec<Keyword>> {
        let mut keywords: Vec<Keyword> = self
            .lock()
            .keywords
            .iter()
            .filter(|k| k.category_id == category_id && k.is_active)
            .cloned()
            .collect();
        keywords.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(keywords)
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScanSchedule>> {
        Ok(self.lock().schedules.get(&id).cloned())
    }

    async fn list_active_schedules(&self) -> Result<Vec<ScanSchedule>> {
        Ok(self
            .lock()
            .schedules
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn record_schedule_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if let Some(schedule) = inner.schedules.get_mut(&id) {
            schedule.last_run_at = Some(last_run_at);
            schedule.next_run_at = next_run_at;
        }
        Ok(())
    }

    async fn update_schedule_next_run(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if let Some(schedule) = inner.schedules.get_mut(&id) {
            schedule.next_run_at = next_run_at;
        }
        Ok(())
    }
}

#[async_trait]
impl BusinessStore for MemoryStore {
    async fn get_business(&self, id: Uuid) -> Result<Option<Business>> {
        Ok(self.lock().businesses.get(&id).cloned())
    }

    async fn find_by_google_place_id(&self, place_id: &str) -> Result<Option<Business>> {
        Ok(self
            .lock()
            .businesses
            .values()
            .find(|b| b.google_place_id.as_deref() == Some(place_id))
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<Business>> {
        Ok(self
            .lock()
            .businesses
            .values()
            .filter(|b| b.phone.as_deref() == Some(phone))
            .cloned()
            .collect())
    }

    async fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<Business>> {
        Ok(self
            .lock()
            .businesses
            .values()
            .filter(|b| b.normalized_name == normalized_name)
            .cloned()
            .collect())
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Vec<Business>> {
        Ok(self
            .lock()
            .businesses
            .values()
            .filter(|b| {
                b.website
                    .as_deref()
                    .and_then(normalize_domain)
                    .map(|d| d == domain)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn insert_business(&self, new: NewBusiness) -> Result<Business> {
        let now = Utc::now();
        let business = Business {
            id: Uuid::new_v4(),
            name: new.name,
            normalized_name: new.normalized_name,
            address: new.address,
            city: new.city,
            state: new.state,
            zip: None,
            phone: new.phone,
            website: new.website,
            google_place_id: new.google_place_id,
            bing_place_id: new.bing_place_id,
            lat: new.lat,
            lng: new.lng,
            category_id: new.category_id,
            google_rating: new.google_rating,
            google_review_count: new.google_review_count,
            bing_rating: new.bing_rating,
            bing_review_count: new.bing_review_count,
            is_claimed: false,
            is_client: false,
            first_seen_at: now,
            last_seen_at: now,
        };
        self.lock().businesses.insert(business.id, business.clone());
        Ok(business)
    }

    async fn merge_business(&self, id: Uuid, merge: BusinessMerge) -> Result<()> {
        let mut inner = self.lock();
        let Some(business) = inner.businesses.get_mut(&id) else {
            bail!("business {id} not found");
        };

        if let Some(phone) = merge.phone {
            business.phone = Some(phone);
        }
        if business.website.is_none() {
            business.website = merge.website;
        }
        if business.google_place_id.is_none() {
            business.google_place_id = merge.google_place_id;
        }
        if business.bing_place_id.is_none() {
            business.bing_place_id = merge.bing_place_id;
        }
        if business.lat.is_none() {
            business.lat = merge.lat;
            business.lng = merge.lng;
        }
        if merge.google_rating.is_some() {
            business.google_rating = merge.google_rating;
        }
        if merge.google_review_count.is_some() {
            business.google_review_count = merge.google_review_count;
        }
        if merge.bing_rating.is_some() {
            business.bing_rating = merge.bing_rating;
        }
        if merge.bing_review_count.is_some() {
            business.bing_review_count = merge.bing_review_count;
        }
        if let Some(last_seen_at) = merge.last_seen_at {
            business.last_seen_at = last_seen_at;
        }
        Ok(())
    }

    async fn insert_review_snapshot(
        &self,
        business_id: Uuid,
        source: ReviewSource,
        rating: f64,
        review_count: i32,
    ) -> Result<()> {
        self.lock().snapshots.push(ReviewSnapshot {
            id: Uuid::new_v4(),
            business_id,
            source,
            rating,
            review_count,
            captured_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn create_scan(&self, new: NewScan) -> Result<Scan> {
        let scan = Scan {
            id: Uuid::new_v4(),
            service_area_id: new.service_area_id,
            category_id: new.category_id,
            keyword: new.keyword,
            engine_id: new.engine_id,
            grid_size: new.grid_size,
            radius_miles: new.radius_miles,
            status: ScanStatus::Queued,
            points_total: new.points_total,
            points_completed: 0,
            error_message: None,
            scheduled_at: new.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        self.lock().scans.insert(scan.id, scan.clone());
        Ok(scan)
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>> {
        Ok(self.lock().scans.get(&id).cloned())
    }

    async fn create_scan_points(
        &self,
        scan_id: Uuid,
        cells: &[GridCell],
    ) -> Result<Vec<ScanPoint>> {
        let mut inner = self.lock();
        let mut points = Vec::with_capacity(cells.len());
        for cell in cells {
            let point = ScanPoint {
                id: Uuid::new_v4(),
                scan_id,
                grid_row: cell.row,
                grid_col: cell.col,
                lat: cell.lat,
                lng: cell.lng,
                status: ScanPointStatus::Pending,
            };
            inner.points.insert(point.id, point.clone());
            points.push(point);
        }
        Ok(points)
    }

    async fn mark_scan_running(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if let Some(scan) = inner.scans.get_mut(&id) {
            if !scan.status.is_terminal() {
                scan.status = ScanStatus::Running;
                scan.started_at.get_or_insert_with(Utc::now);
            }
        }
        Ok(())
    }

    async fn finalize_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.lock();
        let Some(scan) = inner.scans.get_mut(&id) else {
            return Ok(false);
        };
        if scan.status.is_terminal() {
            return Ok(false);
        }
        scan.status = status;
        scan.error_message = error_message.map(str::to_string);
        scan.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn finalize_scans(
        &self,
        ids: &[Uuid],
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<u64> {
        let mut inner = self.lock();
        let mut updated = 0u64;
        for id in ids {
            if let Some(scan) = inner.scans.get_mut(id) {
                if !scan.status.is_terminal() {
                    scan.status = status;
                    scan.error_message = error_message.map(str::to_string);
                    scan.completed_at = Some(Utc::now());
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn increment_points_completed(&self, scan_id: Uuid) -> Result<()> {
        // Single mutation under one lock acquisition — the in-memory
        // equivalent of `SET points_completed = points_completed + 1`
        let mut inner = self.lock();
        if let Some(scan) = inner.scans.get_mut(&scan_id) {
            scan.points_completed += 1;
        }
        Ok(())
    }

    async fn mark_point(&self, point_id: Uuid, status: ScanPointStatus) -> Result<()> {
        let mut inner = self.lock();
        if let Some(point) = inner.points.get_mut(&point_id) {
            point.status = status;
        }
        Ok(())
    }

    async fn insert_rankings(&self, rankings: &[NewRanking]) -> Result<()> {
        let mut inner = self.lock();
        for ranking in rankings {
            inner.rankings.push(ScanRanking {
                id: Uuid::new_v4(),
                scan_point_id: ranking.scan_point_id,
                business_id: ranking.business_id,
                rank_position: ranking.rank_position,
                result_type: ranking.result_type,
                snippet: ranking.snippet.clone(),
            });
        }
        Ok(())
    }

    async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>> {
        Ok(self
            .lock()
            .scans
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn list_non_terminal_scans(&self, ids: &[Uuid]) -> Result<Vec<Scan>> {
        Ok(self
            .lock()
            .scans
            .values()
            .filter(|s| ids.contains(&s.id) && !s.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_points_by_status(
        &self,
        scan_id: Uuid,
        statuses: &[ScanPointStatus],
    ) -> Result<Vec<ScanPoint>> {
        Ok(self
            .lock()
            .points
            .values()
            .filter(|p| p.scan_id == scan_id && statuses.contains(&p.status))
            .cloned()
            .collect())
    }

    async fn cancel_scan(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        let Some(scan) = inner.scans.get_mut(&id) else {
            return Ok(false);
        };
        if scan.status.is_terminal() {
            return Ok(false);
        }
        scan.status = ScanStatus::Cancelled;
        scan.completed_at = Some(Utc::now());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// StubEngine
// ---------------------------------------------------------------------------

/// Canned-result engine with no pacing. Flip `fail` to make every search
/// error (for partial-failure scenarios).
pub struct StubEngine {
    core: EngineCore,
    results: Vec<ParsedBusiness>,
    fail: AtomicBool,
    captcha: AtomicBool,
    delay_ms: u64,
}

impl StubEngine {
    pub fn new(engine_id: &str) -> Self {
        let config = EngineConfig {
            engine_id: engine_id.to_string(),
            reputation_group: if engine_id.starts_with("google") {
                Some("google".to_string())
            } else {
                None
            },
            throttle: ThrottleConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                max_per_hour: 1_000_000,
                max_per_day: 1_000_000,
                jitter_ms: 0,
                backoff_on_error: false,
                pause_on_captcha_hours: 24,
            },
            is_legitimate_api: true,
            requires_api_key: false,
            referer: None,
        };
        Self {
            core: EngineCore::new(config, Arc::new(ProxyRotator::new(Vec::new()))),
            results: Vec::new(),
            fail: AtomicBool::new(false),
            captcha: AtomicBool::new(false),
            delay_ms: 0,
        }
    }

    /// Builder: every search returns these listings.
    pub fn returning(mut self, results: Vec<ParsedBusiness>) -> Self {
        self.results = results;
        self
    }

    /// Builder: every search stalls this long before answering.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every search comes back as a CAPTCHA interstitial: empty result,
    /// `captcha_detected` set.
    pub fn set_captcha(&self, captcha: bool) {
        self.captcha.store(captcha, Ordering::SeqCst);
    }

    /// Seed today's request counter (for group-cap scenarios).
    pub fn preload_requests_today(&self, n: u32) {
        self.core.preload_requests_today(n);
    }
}

#[async_trait]
impl SearchEngine for StubEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    async fn search(
        &self,
        query: &str,
        point: GeoPoint,
        _city: Option<&str>,
        _state: Option<&str>,
    ) -> Result<SearchResult> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            self.core.record_error();
            bail!("stub engine failure");
        }
        if self.captcha.load(Ordering::SeqCst) {
            return Ok(SearchResult::empty(
                self.engine_id(),
                query,
                point,
                SearchMetadata {
                    captcha_detected: true,
                    response_time_ms: 1,
                    parser_version: "stub-v1".to_string(),
                    proxy_used: false,
                },
            ));
        }
        self.core.record_success();
        Ok(SearchResult {
            engine_id: self.engine_id().to_string(),
            query: query.to_string(),
            location: point,
            timestamp: Utc::now(),
            businesses: self.results.clone(),
            organic_results: Vec::new(),
            metadata: SearchMetadata {
                captcha_detected: false,
                response_time_ms: 1,
                parser_version: "stub-v1".to_string(),
                proxy_used: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrank_common::types::NewScan;
    use crate::traits::ScanStore;

    fn new_scan() -> NewScan {
        NewScan {
            service_area_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: 3,
            radius_miles: 1.0,
            points_total: 9,
            scheduled_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let scan = store.create_scan(new_scan()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..9 {
            let store = store.clone();
            let scan_id = scan.id;
            handles.push(tokio::spawn(async move {
                store.increment_points_completed(scan_id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.scan(scan.id).unwrap().points_completed, 9);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let store = MemoryStore::new();
        let scan = store.create_scan(new_scan()).await.unwrap();

        assert!(store
            .finalize_scan(scan.id, ScanStatus::Completed, None)
            .await
            .unwrap());
        // A later transition attempt must not reopen or overwrite it
        assert!(!store
            .finalize_scan(scan.id, ScanStatus::Failed, Some("late failure"))
            .await
            .unwrap());
        assert!(!store.cancel_scan(scan.id).await.unwrap());

        let row = store.scan(scan.id).unwrap();
        assert_eq!(row.status, ScanStatus::Completed);
        assert!(row.error_message.is_none());
    }
}
