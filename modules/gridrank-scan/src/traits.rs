// Trait abstractions for the scan pipeline's store dependencies.
//
// CatalogStore — service areas, categories, keywords, schedules.
// BusinessStore — entity-resolution queries and merges, review snapshots.
// ScanStore — scan/point/ranking lifecycle, with the atomic point counter.
//
// The Postgres implementations live in gridrank-store; the blanket impls at
// the bottom of this file bridge them onto the traits. `testing::MemoryStore`
// implements all three for deterministic tests: no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gridrank_common::types::{
    Business, Category, GridCell, Keyword, ReviewSource, Scan, ScanPoint, ScanPointStatus,
    ScanSchedule, ScanStatus, ServiceArea,
};

pub use gridrank_common::types::{BusinessMerge, NewBusiness, NewRanking, NewScan};

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_service_area(&self, id: Uuid) -> Result<Option<ServiceArea>>;
    async fn list_active_service_areas(&self) -> Result<Vec<ServiceArea>>;

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>>;
    async fn list_active_categories(&self) -> Result<Vec<Category>>;

    /// Active keywords for a category, highest priority first.
    async fn list_active_keywords(&self, category_id: Uuid) -> Result<Vec<Keyword>>;

    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScanSchedule>>;
    async fn list_active_schedules(&self) -> Result<Vec<ScanSchedule>>;

    /// Stamp a schedule's `last_run_at` (and `next_run_at` when known).
    async fn record_schedule_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn update_schedule_next_run(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// BusinessStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn get_business(&self, id: Uuid) -> Result<Option<Business>>;

    /// Exact google place id match — unique across all businesses.
    async fn find_by_google_place_id(&self, place_id: &str) -> Result<Option<Business>>;

    /// All businesses sharing a normalized phone.
    async fn find_by_phone(&self, phone: &str) -> Result<Vec<Business>>;

    /// All businesses sharing a normalized name.
    async fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<Business>>;

    /// All businesses whose website normalizes to the given domain.
    async fn find_by_domain(&self, domain: &str) -> Result<Vec<Business>>;

    async fn insert_business(&self, business: NewBusiness) -> Result<Business>;

    async fn merge_business(&self, id: Uuid, merge: BusinessMerge) -> Result<()>;

    async fn insert_review_snapshot(
        &self,
        business_id: Uuid,
        source: ReviewSource,
        rating: f64,
        review_count: i32,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ScanStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn create_scan(&self, scan: NewScan) -> Result<Scan>;
    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>>;

    /// Persist one ScanPoint per grid cell, all `pending`.
    async fn create_scan_points(&self, scan_id: Uuid, cells: &[GridCell]) -> Result<Vec<ScanPoint>>;

    /// Flip a queued scan to running and stamp `started_at`.
    async fn mark_scan_running(&self, id: Uuid) -> Result<()>;

    /// Terminal transition guarded on non-terminal current status; stamps
    /// `completed_at`. Returns false when the scan was already terminal.
    async fn finalize_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<bool>;

    /// Batched terminal transition with the same non-terminal guard.
    async fn finalize_scans(
        &self,
        ids: &[Uuid],
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<u64>;

    /// `points_completed ← points_completed + 1`, pushed down as an atomic
    /// increment — never read-modify-write in the application.
    async fn increment_points_completed(&self, scan_id: Uuid) -> Result<()>;

    async fn mark_point(&self, point_id: Uuid, status: ScanPointStatus) -> Result<()>;

    async fn insert_rankings(&self, rankings: &[NewRanking]) -> Result<()>;

    async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>>;

    /// The given scans, filtered to those still non-terminal.
    async fn list_non_terminal_scans(&self, ids: &[Uuid]) -> Result<Vec<Scan>>;

    async fn list_points_by_status(
        &self,
        scan_id: Uuid,
        statuses: &[ScanPointStatus],
    ) -> Result<Vec<ScanPoint>>;

    /// Cancel a non-terminal scan. Returns false when already terminal.
    async fn cancel_scan(&self, id: Uuid) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Postgres bridge
// ---------------------------------------------------------------------------

use gridrank_store::PgStore;

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_service_area(&self, id: Uuid) -> Result<Option<ServiceArea>> {
        PgStore::get_service_area(self, id).await
    }

    async fn list_active_service_areas(&self) -> Result<Vec<ServiceArea>> {
        PgStore::list_active_service_areas(self).await
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        PgStore::get_category(self, id).await
    }

    async fn list_active_categories(&self) -> Result<Vec<Category>> {
        PgStore::list_active_categories(self).await
    }

    async fn list_active_keywords(&self, category_id: Uuid) -> Result<Vec<Keyword>> {
        PgStore::list_active_keywords(self, category_id).await
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScanSchedule>> {
        PgStore::get_schedule(self, id).await
    }

    async fn list_active_schedules(&self) -> Result<Vec<ScanSchedule>> {
        PgStore::list_active_schedules(self).await
    }

    async fn record_schedule_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        PgStore::record_schedule_run(self, id, last_run_at, next_run_at).await
    }

    async fn update_schedule_next_run(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        PgStore::update_schedule_next_run(self, id, next_run_at).await
    }
}

#[async_trait]
impl BusinessStore for PgStore {
    async fn get_business(&self, id: Uuid) -> Result<Option<Business>> {
        PgStore::get_business(self, id).await
    }

    async fn find_by_google_place_id(&self, place_id: &str) -> Result<Option<Business>> {
        PgStore::find_by_google_place_id(self, place_id).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<Business>> {
        PgStore::find_by_phone(self, phone).await
    }

    async fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<Business>> {
        PgStore::find_by_normalized_name(self, normalized_name).await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Vec<Business>> {
        PgStore::find_by_domain(self, domain).await
    }

    async fn insert_business(&self, business: NewBusiness) -> Result<Business> {
        PgStore::insert_business(self, business).await
    }

    async fn merge_business(&self, id: Uuid, merge: BusinessMerge) -> Result<()> {
        PgStore::merge_business(self, id, merge).await
    }

    async fn insert_review_snapshot(
        &self,
        business_id: Uuid,
        source: ReviewSource,
        rating: f64,
        review_count: i32,
    ) -> Result<()> {
        PgStore::insert_review_snapshot(self, business_id, source, rating, review_count).await
    }
}

#[async_trait]
impl ScanStore for PgStore {
    async fn create_scan(&self, scan: NewScan) -> Result<Scan> {
        PgStore::create_scan(self, scan).await
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>> {
        PgStore::get_scan(self, id).await
    }

    async fn create_scan_points(&self, scan_id: Uuid, cells: &[GridCell]) -> Result<Vec<ScanPoint>> {
        PgStore::create_scan_points(self, scan_id, cells).await
    }

    async fn mark_scan_running(&self, id: Uuid) -> Result<()> {
        PgStore::mark_scan_running(self, id).await
    }

    async fn finalize_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        PgStore::finalize_scan(self, id, status, error_message).await
    }

    async fn finalize_scans(
        &self,
        ids: &[Uuid],
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<u64> {
        PgStore::finalize_scans(self, ids, status, error_message).await
    }

    async fn increment_points_completed(&self, scan_id: Uuid) -> Result<()> {
        PgStore::increment_points_completed(self, scan_id).await
    }

    async fn mark_point(&self, point_id: Uuid, status: ScanPointStatus) -> Result<()> {
        PgStore::mark_point(self, point_id, status).await
    }

    async fn insert_rankings(&self, rankings: &[NewRanking]) -> Result<()> {
        PgStore::insert_rankings(self, rankings).await
    }

    async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>> {
        PgStore::list_scans_by_status(self, statuses).await
    }

    async fn list_non_terminal_scans(&self, ids: &[Uuid]) -> Result<Vec<Scan>> {
        PgStore::list_non_terminal_scans(self, ids).await
    }

    async fn list_points_by_status(
        &self,
        scan_id: Uuid,
        statuses: &[ScanPointStatus],
    ) -> Result<Vec<ScanPoint>> {
        PgStore::list_points_by_status(self, scan_id, statuses).await
    }

    async fn cancel_scan(&self, id: Uuid) -> Result<bool> {
        PgStore::cancel_scan(self, id).await
    }
}
