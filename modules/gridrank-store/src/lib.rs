//! Postgres persistence for the scan pipeline.
//!
//! One `PgStore` over a shared pool; raw SQL with runtime binds, typed row
//! structs, and domain-type conversion at the edge. The scan pipeline talks
//! to this through its trait boundary, never directly.

mod businesses;
mod catalog;
mod rows;
mod scans;

use anyhow::{Context, Result};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }
}
