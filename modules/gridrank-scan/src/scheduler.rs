//! Cron-driven recurring scans.
//!
//! Each active `ScanSchedule` row becomes one cron job; a firing calls
//! `create_full_scan` with the schedule's fields and stamps its run times.
//! Reloading a schedule always stops the old job before registering the new
//! one, so an edited schedule can never fire twice.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use gridrank_common::types::ScanSchedule;
use gridrank_common::GridRankError;

use crate::orchestrator::{CreateFullScanRequest, ScanOrchestrator};
use crate::traits::CatalogStore;

pub struct ScanScheduler {
    catalog: Arc<dyn CatalogStore>,
    orchestrator: Arc<ScanOrchestrator>,
    sched: JobScheduler,
    /// schedule id → registered cron job id
    jobs: Mutex<HashMap<Uuid, Uuid>>,
}

impl ScanScheduler {
    pub async fn new(
        catalog: Arc<dyn CatalogStore>,
        orchestrator: Arc<ScanOrchestrator>,
    ) -> Result<Self> {
        let sched = JobScheduler::new()
            .await
            .context("Failed to create cron scheduler")?;
        Ok(Self {
            catalog,
            orchestrator,
            sched,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Register every active schedule and start the cron runtime.
    pub async fn start(&self) -> Result<()> {
        self.reload_all().await?;
        let mut sched = self.sched.clone();
        sched.start().await.context("Failed to start cron scheduler")?;
        info!("Scan scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut sched = self.sched.clone();
        sched
            .shutdown()
            .await
            .context("Failed to shut down cron scheduler")?;
        self.jobs.lock().await.clear();
        info!("Scan scheduler stopped");
        Ok(())
    }

    /// Drop and re-register every active schedule. Invalid cron expressions
    /// are logged and skipped, never fatal.
    pub async fn reload_all(&self) -> Result<()> {
        let existing: Vec<Uuid> = self.jobs.lock().await.keys().copied().collect();
        for schedule_id in existing {
            self.remove_job(schedule_id).await;
        }

        let schedules = self.catalog.list_active_schedules().await?;
        let total = schedules.len();
        let mut registered = 0usize;
        for schedule in schedules {
            match self.register(schedule).await {
                Ok(()) => registered += 1,
                Err(e) => warn!(error = %e, "Skipping schedule"),
            }
        }
        info!(registered, total, "Schedules loaded");
        Ok(())
    }

    /// Idempotent hot-reload of one schedule: stop any existing job first,
    /// then re-register if the schedule is still active.
    pub async fn reload_schedule(&self, schedule_id: Uuid) -> Result<()> {
        self.remove_job(schedule_id).await;

        match self.catalog.get_schedule(schedule_id).await? {
            Some(schedule) if schedule.is_active => self.register(schedule).await,
            Some(_) | None => {
                info!(schedule_id = %schedule_id, "Schedule inactive or gone; job removed");
                Ok(())
            }
        }
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    async fn remove_job(&self, schedule_id: Uuid) {
        if let Some(job_id) = self.jobs.lock().await.remove(&schedule_id) {
            let mut sched = self.sched.clone();
            if let Err(e) = sched.remove(&job_id).await {
                warn!(schedule_id = %schedule_id, error = %e, "Failed to remove cron job");
            }
        }
    }

    async fn register(&self, schedule: ScanSchedule) -> Result<()> {
        let expression = normalize_cron(&schedule.cron_expression);

        let catalog = self.catalog.clone();
        let orchestrator = self.orchestrator.clone();
        let fired = Arc::new(schedule.clone());

        let job = Job::new_async(expression.as_str(), move |job_id, mut handle| {
            let catalog = catalog.clone();
            let orchestrator = orchestrator.clone();
            let schedule = fired.clone();
            Box::pin(async move {
                info!(schedule = %schedule.name, "Schedule fired");

                let request = CreateFullScanRequest {
                    service_area_ids: some_if_nonempty(&schedule.service_area_ids),
                    category_ids: some_if_nonempty(&schedule.category_ids),
                    engine_ids: some_if_nonempty(&schedule.engine_ids),
                    grid_size: Some(schedule.grid_size),
                };
                match orchestrator.create_full_scan(request).await {
                    Ok(scans) => {
                        info!(schedule = %schedule.name, scans = scans.len(), "Scheduled scans created")
                    }
                    Err(e) => warn!(schedule = %schedule.name, error = %e, "Scheduled scan failed"),
                }

                let next_run = handle.next_tick_for_job(job_id).await.ok().flatten();
                if let Err(e) = catalog
                    .record_schedule_run(schedule.id, Utc::now(), next_run)
                    .await
                {
                    warn!(schedule = %schedule.name, error = %e, "Failed to stamp schedule run");
                }
            })
        })
        .map_err(|e| {
            GridRankError::Scheduler(format!(
                "Invalid cron expression '{}' for schedule '{}': {e}",
                schedule.cron_expression, schedule.name
            ))
        })?;

        let mut sched = self.sched.clone();
        let job_id = sched
            .add(job)
            .await
            .map_err(|e| GridRankError::Scheduler(format!("Failed to add cron job: {e}")))?;
        self.jobs.lock().await.insert(schedule.id, job_id);

        // Stamp the first upcoming fire time when the runtime can answer
        if let Ok(next_run) = sched.next_tick_for_job(job_id).await {
            if let Err(e) = self
                .catalog
                .update_schedule_next_run(schedule.id, next_run)
                .await
            {
                warn!(schedule = %schedule.name, error = %e, "Failed to stamp next run");
            }
        }

        info!(
            schedule = %schedule.name,
            cron = %schedule.cron_expression,
            "Schedule registered"
        );
        Ok(())
    }
}

/// The cron runtime wants a seconds field; classic 5-field expressions get
/// one prepended.
fn normalize_cron(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

fn some_if_nonempty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items.to_vec())
    }
}
