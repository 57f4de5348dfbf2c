//! Scan, scan-point, and ranking rows. The point counter moves only via an
//! atomic SQL increment; terminal transitions are guarded on the current
//! status so a finished scan can never reopen.

use anyhow::{Context, Result};
use uuid::Uuid;

use gridrank_common::types::{
    GridCell, NewRanking, NewScan, Scan, ScanPoint, ScanPointStatus, ScanStatus,
};

use crate::rows::{result_type_str, ScanPointRow, ScanRow};
use crate::PgStore;

impl PgStore {
    pub async fn create_scan(&self, new: NewScan) -> Result<Scan> {
        let row = sqlx::query_as::<_, ScanRow>(
            r#"
            INSERT INTO scans
                (service_area_id, category_id, keyword, engine_id, grid_size,
                 radius_miles, status, points_total, scheduled_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'queued', $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.service_area_id)
        .bind(new.category_id)
        .bind(&new.keyword)
        .bind(&new.engine_id)
        .bind(new.grid_size)
        .bind(new.radius_miles)
        .bind(new.points_total)
        .bind(new.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create scan")?;
        Ok(row.into())
    }

    pub async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>> {
        let row = sqlx::query_as::<_, ScanRow>("SELECT * FROM scans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch scan")?;
        Ok(row.map(Into::into))
    }

    pub async fn create_scan_points(
        &self,
        scan_id: Uuid,
        cells: &[GridCell],
    ) -> Result<Vec<ScanPoint>> {
        let mut rows: Vec<ScanPointRow> = Vec::with_capacity(cells.len());
        for cell in cells {
            let row = sqlx::query_as::<_, ScanPointRow>(
                r#"
                INSERT INTO scan_points (scan_id, grid_row, grid_col, lat, lng)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(scan_id)
            .bind(cell.row)
            .bind(cell.col)
            .bind(cell.lat)
            .bind(cell.lng)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create scan point")?;
            rows.push(row);
        }
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn mark_scan_running(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET status = 'running', started_at = COALESCE(started_at, now())
            WHERE id = $1 AND status IN ('pending', 'queued', 'running')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark scan running")?;
        Ok(())
    }

    pub async fn finalize_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $2, error_message = $3, completed_at = now()
            WHERE id = $1 AND status IN ('pending', 'queued', 'running')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("Failed to finalize scan")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn finalize_scans(
        &self,
        ids: &[Uuid],
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $2, error_message = $3, completed_at = now()
            WHERE id = ANY($1) AND status IN ('queued', 'running')
            "#,
        )
        .bind(ids.to_vec())
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("Failed to finalize scans")?;
        Ok(result.rows_affected())
    }

    pub async fn increment_points_completed(&self, scan_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE scans SET points_completed = points_completed + 1 WHERE id = $1",
        )
        .bind(scan_id)
        .execute(&self.pool)
        .await
        .context("Failed to increment point counter")?;
        Ok(())
    }

    pub async fn mark_point(&self, point_id: Uuid, status: ScanPointStatus) -> Result<()> {
        sqlx::query("UPDATE scan_points SET status = $2 WHERE id = $1")
            .bind(point_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to mark scan point")?;
        Ok(())
    }

    pub async fn insert_rankings(&self, rankings: &[NewRanking]) -> Result<()> {
        for ranking in rankings {
            sqlx::query(
                r#"
                INSERT INTO scan_rankings
                    (scan_point_id, business_id, rank_position, result_type, snippet)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(ranking.scan_point_id)
            .bind(ranking.business_id)
            .bind(ranking.rank_position)
            .bind(result_type_str(ranking.result_type))
            .bind(&ranking.snippet)
            .execute(&self.pool)
            .await
            .context("Failed to insert ranking")?;
        }
        Ok(())
    }

    pub async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>> {
        let status_strs: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, ScanRow>(
            "SELECT * FROM scans WHERE status = ANY($1) ORDER BY created_at",
        )
        .bind(&status_strs)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list scans by status")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_non_terminal_scans(&self, ids: &[Uuid]) -> Result<Vec<Scan>> {
        let rows = sqlx::query_as::<_, ScanRow>(
            r#"
            SELECT * FROM scans
            WHERE id = ANY($1) AND status IN ('pending', 'queued', 'running')
            ORDER BY created_at
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list non-terminal scans")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_points_by_status(
        &self,
        scan_id: Uuid,
        statuses: &[ScanPointStatus],
    ) -> Result<Vec<ScanPoint>> {
        let status_strs: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, ScanPointRow>(
            r#"
            SELECT * FROM scan_points
            WHERE scan_id = $1 AND status = ANY($2)
            ORDER BY grid_row, grid_col
            "#,
        )
        .bind(scan_id)
        .bind(&status_strs)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list scan points")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn cancel_scan(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = 'cancelled', completed_at = now()
            WHERE id = $1 AND status IN ('pending', 'queued', 'running')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel scan")?;
        Ok(result.rows_affected() > 0)
    }
}
