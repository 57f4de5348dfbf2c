//! Row structs and their domain-type conversions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use gridrank_common::types::{
    Business, Category, Keyword, ResultType, Scan, ScanPoint, ScanPointStatus, ScanSchedule,
    ScanStatus, ServiceArea,
};

#[derive(Debug, FromRow)]
pub(crate) struct ServiceAreaRow {
    pub id: Uuid,
    pub name: String,
    pub state: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_miles: f64,
    pub is_active: bool,
}

impl From<ServiceAreaRow> for ServiceArea {
    fn from(row: ServiceAreaRow) -> Self {
        ServiceArea {
            id: row.id,
            name: row.name,
            state: row.state,
            center_lat: row.center_lat,
            center_lng: row.center_lng,
            radius_miles: row.radius_miles,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            parent_id: row.parent_id,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct KeywordRow {
    pub id: Uuid,
    pub category_id: Uuid,
    pub text: String,
    pub priority: i32,
    pub is_active: bool,
}

impl From<KeywordRow> for Keyword {
    fn from(row: KeywordRow) -> Self {
        Keyword {
            id: row.id,
            category_id: row.category_id,
            text: row.text,
            priority: row.priority,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BusinessRow {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub google_place_id: Option<String>,
    pub bing_place_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub category_id: Option<Uuid>,
    pub google_rating: Option<f64>,
    pub google_review_count: Option<i32>,
    pub bing_rating: Option<f64>,
    pub bing_review_count: Option<i32>,
    pub is_claimed: bool,
    pub is_client: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl From<BusinessRow> for Business {
    fn from(row: BusinessRow) -> Self {
        Business {
            id: row.id,
            name: row.name,
            normalized_name: row.normalized_name,
            address: row.address,
            city: row.city,
            state: row.state,
            zip: row.zip,
            phone: row.phone,
            website: row.website,
            google_place_id: row.google_place_id,
            bing_place_id: row.bing_place_id,
            lat: row.lat,
            lng: row.lng,
            category_id: row.category_id,
            google_rating: row.google_rating,
            google_review_count: row.google_review_count,
            bing_rating: row.bing_rating,
            bing_review_count: row.bing_review_count,
            is_claimed: row.is_claimed,
            is_client: row.is_client,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ScanRow {
    pub id: Uuid,
    pub service_area_id: Uuid,
    pub category_id: Uuid,
    pub keyword: String,
    pub engine_id: String,
    pub grid_size: i32,
    pub radius_miles: f64,
    pub status: String,
    pub points_total: i32,
    pub points_completed: i32,
    pub error_message: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ScanRow> for Scan {
    fn from(row: ScanRow) -> Self {
        Scan {
            id: row.id,
            service_area_id: row.service_area_id,
            category_id: row.category_id,
            keyword: row.keyword,
            engine_id: row.engine_id,
            grid_size: row.grid_size,
            radius_miles: row.radius_miles,
            status: ScanStatus::from_str(&row.status).unwrap_or(ScanStatus::Failed),
            points_total: row.points_total,
            points_completed: row.points_completed,
            error_message: row.error_message,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ScanPointRow {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub grid_row: i32,
    pub grid_col: i32,
    pub lat: f64,
    pub lng: f64,
    pub status: String,
}

impl From<ScanPointRow> for ScanPoint {
    fn from(row: ScanPointRow) -> Self {
        ScanPoint {
            id: row.id,
            scan_id: row.scan_id,
            grid_row: row.grid_row,
            grid_col: row.grid_col,
            lat: row.lat,
            lng: row.lng,
            status: ScanPointStatus::from_str(&row.status).unwrap_or(ScanPointStatus::Failed),
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ScanScheduleRow {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub service_area_ids: Vec<Uuid>,
    pub category_ids: Vec<Uuid>,
    pub engine_ids: Vec<String>,
    pub grid_size: i32,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl From<ScanScheduleRow> for ScanSchedule {
    fn from(row: ScanScheduleRow) -> Self {
        ScanSchedule {
            id: row.id,
            name: row.name,
            cron_expression: row.cron_expression,
            service_area_ids: row.service_area_ids,
            category_ids: row.category_ids,
            engine_ids: row.engine_ids,
            grid_size: row.grid_size,
            is_active: row.is_active,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
        }
    }
}

/// Wire name for a ranking's result type column.
pub(crate) fn result_type_str(result_type: ResultType) -> &'static str {
    result_type.as_str()
}
