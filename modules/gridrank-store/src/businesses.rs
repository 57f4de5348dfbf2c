//! Business rows: entity-resolution lookups, creation, merges, and the
//! review-snapshot time series.

use anyhow::{Context, Result};
use uuid::Uuid;

use gridrank_common::normalize::normalize_domain;
use gridrank_common::types::{Business, BusinessMerge, NewBusiness, ReviewSource};

use crate::rows::BusinessRow;
use crate::PgStore;

impl PgStore {
    pub async fn get_business(&self, id: Uuid) -> Result<Option<Business>> {
        let row = sqlx::query_as::<_, BusinessRow>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch business")?;
        Ok(row.map(Into::into))
    }

    pub async fn find_by_google_place_id(&self, place_id: &str) -> Result<Option<Business>> {
        let row = sqlx::query_as::<_, BusinessRow>(
            "SELECT * FROM businesses WHERE google_place_id = $1",
        )
        .bind(place_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up business by place id")?;
        Ok(row.map(Into::into))
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Vec<Business>> {
        let rows = sqlx::query_as::<_, BusinessRow>(
            "SELECT * FROM businesses WHERE phone = $1 ORDER BY first_seen_at",
        )
        .bind(phone)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up businesses by phone")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<Business>> {
        let rows = sqlx::query_as::<_, BusinessRow>(
            "SELECT * FROM businesses WHERE normalized_name = $1 ORDER BY first_seen_at",
        )
        .bind(normalized_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up businesses by name")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Websites are stored as given; match on the normalized domain here.
    pub async fn find_by_domain(&self, domain: &str) -> Result<Vec<Business>> {
        let rows = sqlx::query_as::<_, BusinessRow>(
            r#"
            SELECT * FROM businesses
            WHERE website IS NOT NULL AND website ILIKE '%' || $1 || '%'
            ORDER BY first_seen_at
            "#,
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up businesses by domain")?;

        // The ILIKE prefilter over-matches; confirm with real normalization
        Ok(rows
            .into_iter()
            .map(Business::from)
            .filter(|b| {
                b.website
                    .as_deref()
                    .and_then(normalize_domain)
                    .map(|d| d == domain)
                    .unwrap_or(false)
            })
            .collect())
    }

    pub async fn insert_business(&self, new: NewBusiness) -> Result<Business> {
        let row = sqlx::query_as::<_, BusinessRow>(
            r#"
            INSERT INTO businesses
                (name, normalized_name, address, city, state, phone, website,
                 google_place_id, bing_place_id, lat, lng, category_id,
                 google_rating, google_review_count, bing_rating, bing_review_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.normalized_name)
        .bind(&new.address)
        .bind(&new.city)
        .bind(&new.state)
        .bind(&new.phone)
        .bind(&new.website)
        .bind(&new.google_place_id)
        .bind(&new.bing_place_id)
        .bind(new.lat)
        .bind(new.lng)
        .bind(new.category_id)
        .bind(new.google_rating)
        .bind(new.google_review_count)
        .bind(new.bing_rating)
        .bind(new.bing_review_count)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert business")?;
        Ok(row.into())
    }

    pub async fn merge_business(&self, id: Uuid, merge: BusinessMerge) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE businesses SET
                phone = COALESCE($2, phone),
                website = COALESCE(website, $3),
                google_place_id = COALESCE(google_place_id, $4),
                bing_place_id = COALESCE(bing_place_id, $5),
                lat = COALESCE(lat, $6),
                lng = COALESCE(lng, $7),
                google_rating = COALESCE($8, google_rating),
                google_review_count = COALESCE($9, google_review_count),
                bing_rating = COALESCE($10, bing_rating),
                bing_review_count = COALESCE($11, bing_review_count),
                last_seen_at = COALESCE($12, last_seen_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&merge.phone)
        .bind(&merge.website)
        .bind(&merge.google_place_id)
        .bind(&merge.bing_place_id)
        .bind(merge.lat)
        .bind(merge.lng)
        .bind(merge.google_rating)
        .bind(merge.google_review_count)
        .bind(merge.bing_rating)
        .bind(merge.bing_review_count)
        .bind(merge.last_seen_at)
        .execute(&self.pool)
        .await
        .context("Failed to merge business")?;
        Ok(())
    }

    pub async fn insert_review_snapshot(
        &self,
        business_id: Uuid,
        source: ReviewSource,
        rating: f64,
        review_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO review_snapshots (business_id, source, rating, review_count)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(business_id)
        .bind(source.as_str())
        .bind(rating)
        .bind(review_count)
        .execute(&self.pool)
        .await
        .context("Failed to insert review snapshot")?;
        Ok(())
    }
}
