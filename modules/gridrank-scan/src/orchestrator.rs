//! Scan orchestration: record creation, task handling, completion
//! monitoring, and restart recovery.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use gridrank_common::types::{
    GeoPoint, ReviewSource, Scan, ScanPointStatus, ScanStatus, ServiceArea,
};
use gridrank_common::GridRankError;
use gridrank_engines::EngineRegistry;

use crate::grid::{self, VALID_GRID_SIZES};
use crate::matcher::BusinessMatcher;
use crate::queue::{GroupDailyTotal, ScanQueue, ScanTask, TaskHandler};
use crate::traits::{BusinessStore, CatalogStore, NewRanking, NewScan, ScanStore};

/// Poll cadence and timeout for the single-scan monitor.
const SCAN_POLL_SECS: u64 = 5;
const SCAN_TIMEOUT_SECS: u64 = 30 * 60;

/// Poll cadence and timeout for the batch monitor.
const BATCH_POLL_SECS: u64 = 15;
const BATCH_TIMEOUT_SECS: u64 = 6 * 60 * 60;

const TASK_PRIORITY: u8 = 1;

#[derive(Debug, Clone)]
pub struct CreateScanRequest {
    pub service_area_id: Uuid,
    pub category_id: Uuid,
    pub keyword: String,
    pub engine_id: String,
    pub grid_size: Option<i32>,
}

/// Expansion request: missing sets default to everything active.
#[derive(Debug, Clone, Default)]
pub struct CreateFullScanRequest {
    pub service_area_ids: Option<Vec<Uuid>>,
    pub category_ids: Option<Vec<Uuid>>,
    pub engine_ids: Option<Vec<String>>,
    pub grid_size: Option<i32>,
}

pub struct ScanOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    businesses: Arc<dyn BusinessStore>,
    scans: Arc<dyn ScanStore>,
    registry: Arc<EngineRegistry>,
    queue: ScanQueue,
    matcher: BusinessMatcher,
    default_grid_size: i32,
}

impl ScanOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        businesses: Arc<dyn BusinessStore>,
        scans: Arc<dyn ScanStore>,
        registry: Arc<EngineRegistry>,
        queue: ScanQueue,
        default_grid_size: i32,
    ) -> Arc<Self> {
        let matcher = BusinessMatcher::new(businesses.clone());
        Arc::new(Self {
            catalog,
            businesses,
            scans,
            registry,
            queue,
            matcher,
            default_grid_size,
        })
    }

    /// The accessor the queue uses to enforce the combined google daily cap.
    pub fn group_daily_total(registry: &Arc<EngineRegistry>) -> GroupDailyTotal {
        let registry = registry.clone();
        Arc::new(move |group: &str| registry.group_requests_today(group))
    }

    pub fn queue(&self) -> &ScanQueue {
        &self.queue
    }

    fn monitor(&self) -> ScanMonitor {
        ScanMonitor {
            scans: self.scans.clone(),
            queue: self.queue.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Scan creation
    // -----------------------------------------------------------------------

    /// Create and start a single scan, with its own background monitor.
    pub async fn create_scan(&self, request: CreateScanRequest) -> Result<Scan> {
        let grid_size = request.grid_size.unwrap_or(self.default_grid_size);
        let (area, scan) = self
            .create_scan_record(
                request.service_area_id,
                request.category_id,
                &request.keyword,
                &request.engine_id,
                grid_size,
            )
            .await?;

        info!(
            scan_id = %scan.id,
            area = %area.name,
            keyword = %scan.keyword,
            engine = %scan.engine_id,
            points = scan.points_total,
            "Scan created"
        );

        let monitor = self.monitor();
        let scan_id = scan.id;
        let engine_id = scan.engine_id.clone();
        tokio::spawn(async move { monitor.monitor_scan(scan_id, engine_id).await });

        Ok(scan)
    }

    /// Expand (areas × categories × keywords × engines) into scans, all
    /// watched by one batch monitor.
    pub async fn create_full_scan(&self, request: CreateFullScanRequest) -> Result<Vec<Scan>> {
        let grid_size = request.grid_size.unwrap_or(self.default_grid_size);

        let areas = match request.service_area_ids {
            Some(ids) => self.resolve_areas(&ids).await?,
            None => self.catalog.list_active_service_areas().await?,
        };
        let categories = match request.category_ids {
            Some(ids) => self.resolve_categories(&ids).await?,
            None => self.catalog.list_active_categories().await?,
        };
        let engine_ids = match request.engine_ids {
            Some(ids) => ids,
            None => self.registry.ids(),
        };

        if areas.is_empty() || categories.is_empty() || engine_ids.is_empty() {
            return Err(GridRankError::Validation(
                "Full scan needs at least one active area, category, and engine".to_string(),
            )
            .into());
        }

        let mut scans = Vec::new();
        for area in &areas {
            for category in &categories {
                let keywords = self.keywords_for(category).await?;
                for keyword in &keywords {
                    for engine_id in &engine_ids {
                        match self
                            .create_scan_record(area.id, category.id, keyword, engine_id, grid_size)
                            .await
                        {
                            Ok((_, scan)) => scans.push(scan),
                            Err(e) => warn!(
                                area = %area.name,
                                category = %category.name,
                                keyword = %keyword,
                                engine = %engine_id,
                                error = %e,
                                "Skipping combination"
                            ),
                        }
                    }
                }
            }
        }

        info!(scans = scans.len(), grid_size, "Full scan created");

        if !scans.is_empty() {
            let monitor = self.monitor();
            let ids: Vec<Uuid> = scans.iter().map(|s| s.id).collect();
            tokio::spawn(async move { monitor.monitor_batch(ids).await });
        }

        Ok(scans)
    }

    /// Cancel a non-terminal scan. Queued tasks are purged lazily — the
    /// handler no-ops on terminal scans — and in-flight work completes.
    pub async fn cancel_scan(&self, scan_id: Uuid) -> Result<bool> {
        let cancelled = self.scans.cancel_scan(scan_id).await?;
        if cancelled {
            info!(scan_id = %scan_id, "Scan cancelled");
        }
        Ok(cancelled)
    }

    async fn resolve_areas(&self, ids: &[Uuid]) -> Result<Vec<ServiceArea>> {
        let mut areas = Vec::with_capacity(ids.len());
        for id in ids {
            match self.catalog.get_service_area(*id).await? {
                Some(area) if area.is_active => areas.push(area),
                Some(_) | None => {
                    return Err(GridRankError::Validation(format!(
                        "Service area {id} not found or inactive"
                    ))
                    .into())
                }
            }
        }
        Ok(areas)
    }

    async fn resolve_categories(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<gridrank_common::types::Category>> {
        let mut categories = Vec::with_capacity(ids.len());
        for id in ids {
            match self.catalog.get_category(*id).await? {
                Some(category) if category.is_active => categories.push(category),
                Some(_) | None => {
                    return Err(GridRankError::Validation(format!(
                        "Category {id} not found or inactive"
                    ))
                    .into())
                }
            }
        }
        Ok(categories)
    }

    /// A category with no active keywords falls back to its own name.
    async fn keywords_for(&self, category: &gridrank_common::types::Category) -> Result<Vec<String>> {
        let keywords = self.catalog.list_active_keywords(category.id).await?;
        if keywords.is_empty() {
            Ok(vec![category.name.clone()])
        } else {
            Ok(keywords.into_iter().map(|k| k.text).collect())
        }
    }

    /// Validate, persist the scan and its grid, enqueue one task per point,
    /// and flip the scan to running.
    async fn create_scan_record(
        &self,
        service_area_id: Uuid,
        category_id: Uuid,
        keyword: &str,
        engine_id: &str,
        grid_size: i32,
    ) -> Result<(ServiceArea, Scan)> {
        if !VALID_GRID_SIZES.contains(&grid_size) {
            return Err(GridRankError::Validation(format!(
                "Invalid grid size {grid_size}; must be one of {VALID_GRID_SIZES:?}"
            ))
            .into());
        }
        if keyword.trim().is_empty() {
            return Err(GridRankError::Validation("Keyword must not be empty".to_string()).into());
        }
        if !self.registry.contains(engine_id) {
            return Err(
                GridRankError::Validation(format!("Engine '{engine_id}' is not registered")).into(),
            );
        }

        let area = self
            .catalog
            .get_service_area(service_area_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| {
                GridRankError::Validation(format!(
                    "Service area {service_area_id} not found or inactive"
                ))
            })?;
        let category = self
            .catalog
            .get_category(category_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| {
                GridRankError::Validation(format!("Category {category_id} not found or inactive"))
            })?;

        let scan = self
            .scans
            .create_scan(NewScan {
                service_area_id: area.id,
                category_id: category.id,
                keyword: keyword.trim().to_string(),
                engine_id: engine_id.to_string(),
                grid_size,
                radius_miles: area.radius_miles,
                points_total: grid_size * grid_size,
                scheduled_at: None,
            })
            .await?;

        let cells = grid::generate(area.center_lat, area.center_lng, area.radius_miles, grid_size);
        let points = self.scans.create_scan_points(scan.id, &cells).await?;

        let tasks: Vec<ScanTask> = points
            .iter()
            .map(|point| ScanTask {
                scan_id: scan.id,
                scan_point_id: point.id,
                engine_id: engine_id.to_string(),
                keyword: scan.keyword.clone(),
                point: GeoPoint::new(point.lat, point.lng),
                city: Some(area.name.clone()),
                state: Some(area.state.clone()),
                priority: TASK_PRIORITY,
            })
            .collect();

        self.queue.enqueue_batch(tasks);
        self.scans.mark_scan_running(scan.id).await?;

        let scan = self
            .scans
            .get_scan(scan.id)
            .await?
            .unwrap_or(scan);

        Ok((area, scan))
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Re-queue the unfinished points of scans left `running`/`queued` by a
    /// previous process, finalize the ones that were actually done, and
    /// start one batch monitor over the survivors. Returns how many scans
    /// were re-queued.
    pub async fn recover_orphaned_scans(&self) -> Result<usize> {
        let orphans = self
            .scans
            .list_scans_by_status(&[ScanStatus::Running, ScanStatus::Queued])
            .await?;

        if orphans.is_empty() {
            info!("No orphaned scans to recover");
            return Ok(0);
        }

        let mut recovered: Vec<Uuid> = Vec::new();
        for scan in orphans {
            match self.recover_one(&scan).await {
                Ok(true) => recovered.push(scan.id),
                Ok(false) => {}
                Err(e) => warn!(scan_id = %scan.id, error = %e, "Failed to recover scan"),
            }
        }

        info!(scans = recovered.len(), "Orphaned scans re-queued");

        if !recovered.is_empty() {
            let monitor = self.monitor();
            let ids = recovered.clone();
            tokio::spawn(async move { monitor.monitor_batch(ids).await });
        }

        Ok(recovered.len())
    }

    async fn recover_one(&self, scan: &Scan) -> Result<bool> {
        let pending = self
            .scans
            .list_points_by_status(scan.id, &[ScanPointStatus::Pending])
            .await?;

        if pending.is_empty() {
            let (status, message) = freeze_outcome(scan);
            self.monitor().finalize(scan, status, message).await;
            return Ok(false);
        }

        let Some(area) = self.catalog.get_service_area(scan.service_area_id).await? else {
            self.monitor()
                .finalize(
                    scan,
                    ScanStatus::Failed,
                    Some("Service area no longer exists".to_string()),
                )
                .await;
            return Ok(false);
        };

        let tasks: Vec<ScanTask> = pending
            .iter()
            .map(|point| ScanTask {
                scan_id: scan.id,
                scan_point_id: point.id,
                engine_id: scan.engine_id.clone(),
                keyword: scan.keyword.clone(),
                point: GeoPoint::new(point.lat, point.lng),
                city: Some(area.name.clone()),
                state: Some(area.state.clone()),
                priority: TASK_PRIORITY,
            })
            .collect();

        info!(
            scan_id = %scan.id,
            tasks = tasks.len(),
            engine = %scan.engine_id,
            "Recovering orphaned scan"
        );

        self.queue.enqueue_batch(tasks);
        if scan.status != ScanStatus::Running {
            self.scans.mark_scan_running(scan.id).await?;
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Monitoring
// ---------------------------------------------------------------------------

/// Detached watcher for scans in flight. Holds only what it needs — the
/// scan store and queue handles — so monitors outlive no one.
#[derive(Clone)]
struct ScanMonitor {
    scans: Arc<dyn ScanStore>,
    queue: ScanQueue,
}

impl ScanMonitor {
    /// Watch one scan to its terminal state: poll every five seconds, freeze
    /// when its engine has gone idle, and fail it after thirty minutes.
    async fn monitor_scan(self, scan_id: Uuid, engine_id: String) {
        let deadline = Utc::now() + chrono::Duration::seconds(SCAN_TIMEOUT_SECS as i64);

        loop {
            tokio::time::sleep(Duration::from_secs(SCAN_POLL_SECS)).await;

            let scan = match self.scans.get_scan(scan_id).await {
                Ok(Some(scan)) => scan,
                Ok(None) => return,
                Err(e) => {
                    error!(scan_id = %scan_id, error = %e, "Monitor failed to read scan");
                    continue;
                }
            };

            if scan.status.is_terminal() {
                return;
            }

            if scan.points_completed >= scan.points_total {
                self.finalize(&scan, ScanStatus::Completed, None).await;
                return;
            }

            if Utc::now() > deadline {
                self.finalize(&scan, ScanStatus::Failed, Some("Scan timed out".to_string()))
                    .await;
                return;
            }

            if self.engine_gone_idle(&engine_id) {
                let (status, message) = freeze_outcome(&scan);
                self.finalize(&scan, status, message).await;
                return;
            }
        }
    }

    /// Watch a whole batch with one query per poll. Individual scans freeze
    /// by the same rule as the single-scan monitor; survivors past the
    /// six-hour deadline are failed together.
    async fn monitor_batch(self, scan_ids: Vec<Uuid>) {
        let deadline = Utc::now() + chrono::Duration::seconds(BATCH_TIMEOUT_SECS as i64);
        info!(scans = scan_ids.len(), "Batch monitor started");

        loop {
            tokio::time::sleep(Duration::from_secs(BATCH_POLL_SECS)).await;

            let open = match self.scans.list_non_terminal_scans(&scan_ids).await {
                Ok(open) => open,
                Err(e) => {
                    error!(error = %e, "Batch monitor query failed");
                    continue;
                }
            };

            if open.is_empty() {
                info!("Batch monitor finished; all scans terminal");
                return;
            }

            if Utc::now() > deadline {
                let ids: Vec<Uuid> = open.iter().map(|s| s.id).collect();
                warn!(scans = ids.len(), "Batch timed out; failing survivors");
                if let Err(e) = self
                    .scans
                    .finalize_scans(&ids, ScanStatus::Failed, Some("Scan timed out"))
                    .await
                {
                    error!(error = %e, "Failed to finalize timed-out batch");
                }
                return;
            }

            let mut completed: Vec<Uuid> = Vec::new();
            for scan in &open {
                if scan.points_completed >= scan.points_total {
                    completed.push(scan.id);
                } else if self.engine_gone_idle(&scan.engine_id) {
                    let (status, message) = freeze_outcome(scan);
                    if status == ScanStatus::Completed {
                        completed.push(scan.id);
                    } else {
                        self.finalize(scan, status, message).await;
                    }
                }
            }

            if !completed.is_empty() {
                if let Err(e) = self
                    .scans
                    .finalize_scans(&completed, ScanStatus::Completed, None)
                    .await
                {
                    error!(error = %e, "Failed to finalize completed scans");
                }
            }
        }
    }

    /// No queued tasks, no live worker, no pending retry — nothing will
    /// move this engine's scans forward.
    fn engine_gone_idle(&self, engine_id: &str) -> bool {
        self.queue.queue_depth(engine_id) == 0
            && !self.queue.is_processing(engine_id)
            && !self.queue.has_retry_timer(engine_id)
    }

    async fn finalize(&self, scan: &Scan, status: ScanStatus, message: Option<String>) {
        match self
            .scans
            .finalize_scan(scan.id, status, message.as_deref())
            .await
        {
            Ok(true) => info!(
                scan_id = %scan.id,
                status = %status,
                completed = scan.points_completed,
                total = scan.points_total,
                "Scan finalized"
            ),
            Ok(false) => {}
            Err(e) => error!(scan_id = %scan.id, error = %e, "Failed to finalize scan"),
        }
    }
}

/// Terminal outcome for a scan whose engine went idle (or whose points are
/// all accounted for at recovery time).
fn freeze_outcome(scan: &Scan) -> (ScanStatus, Option<String>) {
    if scan.points_completed >= scan.points_total {
        (ScanStatus::Completed, None)
    } else {
        (
            ScanStatus::Failed,
            Some(format!(
                "Engine queue empty before all points completed: only {}/{} points completed",
                scan.points_completed, scan.points_total
            )),
        )
    }
}

// ---------------------------------------------------------------------------
// Task handler
// ---------------------------------------------------------------------------

#[async_trait]
impl TaskHandler for ScanOrchestrator {
    /// Runs on the queue worker. Every failure path marks the point and
    /// bumps the counter — failed points still count toward completion, so
    /// the scan always reaches a terminal state.
    async fn handle(&self, task: &ScanTask) -> Result<()> {
        let scan = match self.scans.get_scan(task.scan_id).await {
            Ok(Some(scan)) => scan,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(scan_id = %task.scan_id, error = %e, "Handler failed to read scan");
                return Ok(());
            }
        };
        if scan.status.is_terminal() {
            // Cancelled or already finalized; drop the task quietly
            return Ok(());
        }

        let Some(engine) = self.registry.get(&task.engine_id) else {
            self.fail_point(task).await;
            return Ok(());
        };

        let result = engine
            .search(
                &task.keyword,
                task.point,
                task.city.as_deref(),
                task.state.as_deref(),
            )
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    scan_id = %task.scan_id,
                    engine = %task.engine_id,
                    error = %e,
                    "Search failed; marking point failed"
                );
                self.fail_point(task).await;
                return Ok(());
            }
        };

        // A CAPTCHA interstitial comes back as a well-formed empty result;
        // the point failed even though the engine call didn't error
        if result.metadata.captcha_detected {
            warn!(
                scan_id = %task.scan_id,
                engine = %task.engine_id,
                "Engine blocked mid-scan; marking point failed"
            );
            self.fail_point(task).await;
            return Ok(());
        }

        let mut rankings: Vec<NewRanking> = Vec::with_capacity(result.businesses.len());
        for parsed in &result.businesses {
            let outcome = match self
                .matcher
                .resolve(parsed, &task.engine_id, Some(scan.category_id))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        name = %parsed.name,
                        error = %e,
                        "Failed to resolve business; skipping listing"
                    );
                    continue;
                }
            };

            rankings.push(NewRanking {
                scan_point_id: task.scan_point_id,
                business_id: outcome.business_id,
                rank_position: parsed.rank_position,
                result_type: parsed.result_type,
                snippet: parsed.snippet.clone(),
            });

            if let (Some(rating), Some(review_count)) = (parsed.rating, parsed.review_count) {
                let source = ReviewSource::for_engine(&task.engine_id);
                if let Err(e) = self
                    .businesses
                    .insert_review_snapshot(outcome.business_id, source, rating, review_count)
                    .await
                {
                    warn!(business_id = %outcome.business_id, error = %e, "Failed to record review snapshot");
                }
            }
        }

        if !rankings.is_empty() {
            if let Err(e) = self.scans.insert_rankings(&rankings).await {
                error!(scan_id = %task.scan_id, error = %e, "Failed to persist rankings");
                self.fail_point(task).await;
                return Ok(());
            }
        }

        if let Err(e) = self
            .scans
            .mark_point(task.scan_point_id, ScanPointStatus::Completed)
            .await
        {
            warn!(point_id = %task.scan_point_id, error = %e, "Failed to mark point completed");
        }
        if let Err(e) = self.scans.increment_points_completed(task.scan_id).await {
            warn!(scan_id = %task.scan_id, error = %e, "Failed to increment point counter");
        }

        Ok(())
    }
}

impl ScanOrchestrator {
    /// Best-effort failure bookkeeping for one point.
    async fn fail_point(&self, task: &ScanTask) {
        if let Err(e) = self
            .scans
            .mark_point(task.scan_point_id, ScanPointStatus::Failed)
            .await
        {
            warn!(point_id = %task.scan_point_id, error = %e, "Failed to mark point failed");
        }
        if let Err(e) = self.scans.increment_points_completed(task.scan_id).await {
            warn!(scan_id = %task.scan_id, error = %e, "Failed to increment point counter");
        }
    }
}
