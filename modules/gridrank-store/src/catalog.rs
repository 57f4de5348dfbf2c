//! Service areas, categories, keywords, and scan schedules.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gridrank_common::types::{Category, Keyword, ScanSchedule, ServiceArea};

use crate::rows::{CategoryRow, KeywordRow, ScanScheduleRow, ServiceAreaRow};
use crate::PgStore;

impl PgStore {
    pub async fn get_service_area(&self, id: Uuid) -> Result<Option<ServiceArea>> {
        let row = sqlx::query_as::<_, ServiceAreaRow>(
            "SELECT * FROM service_areas WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch service area")?;
        Ok(row.map(Into::into))
    }

    pub async fn list_active_service_areas(&self) -> Result<Vec<ServiceArea>> {
        let rows = sqlx::query_as::<_, ServiceAreaRow>(
            "SELECT * FROM service_areas WHERE is_active ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list service areas")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch category")?;
        Ok(row.map(Into::into))
    }

    pub async fn list_active_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT * FROM categories WHERE is_active ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_active_keywords(&self, category_id: Uuid) -> Result<Vec<Keyword>> {
        let rows = sqlx::query_as::<_, KeywordRow>(
            r#"
            SELECT * FROM keywords
            WHERE category_id = $1 AND is_active
            ORDER BY priority DESC, text
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list keywords")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_schedule(&self, id: Uuid) -> Result<Option<ScanSchedule>> {
        let row = sqlx::query_as::<_, ScanScheduleRow>(
            "SELECT * FROM scan_schedules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch schedule")?;
        Ok(row.map(Into::into))
    }

    pub async fn list_active_schedules(&self) -> Result<Vec<ScanSchedule>> {
        let rows = sqlx::query_as::<_, ScanScheduleRow>(
            "SELECT * FROM scan_schedules WHERE is_active ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list schedules")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn record_schedule_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scan_schedules SET last_run_at = $2, next_run_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .context("Failed to record schedule run")?;
        Ok(())
    }

    pub async fn update_schedule_next_run(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE scan_schedules SET next_run_at = $2 WHERE id = $1")
            .bind(id)
            .bind(next_run_at)
            .execute(&self.pool)
            .await
            .context("Failed to update schedule next run")?;
        Ok(())
    }
}
