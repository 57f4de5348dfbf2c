use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geography ---

/// A single lat/lng coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One cell of a scan's sampling grid. Row 0 is the north edge, column 0
/// the west edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: i32,
    pub col: i32,
    pub lat: f64,
    pub lng: f64,
}

// --- Catalog entities ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceArea {
    pub id: Uuid,
    pub name: String,
    pub state: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_miles: f64,
    pub is_active: bool,
}

/// Self-referential category tree. `parent_id` is None for roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Uuid,
    pub category_id: Uuid,
    pub text: String,
    pub priority: i32,
    pub is_active: bool,
}

// --- Businesses ---

/// A deduplicated business record. Created by the matcher on first sighting;
/// `first_seen_at` never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    /// Digits-only with country prefix (`+1` + 10 digits for US numbers).
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

// --- Scans ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown ScanStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub service_area_id: Uuid,
    pub category_id: Uuid,
    pub keyword: String,
    pub engine_id: String,
    pub grid_size: i32,
    pub radius_miles: f64,
    pub status: ScanStatus,
    pub points_total: i32,
    pub points_completed: i32,
    pub error_message: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPointStatus {
    Pending,
    Completed,
    Failed,
}

impl ScanPointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPointStatus::Pending => "pending",
            ScanPointStatus::Completed => "completed",
            ScanPointStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ScanPointStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ScanPointStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoint {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub grid_row: i32,
    pub grid_col: i32,
    pub lat: f64,
    pub lng: f64,
    pub status: ScanPointStatus,
}

/// One business's position at one grid point for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRanking {
    pub id: Uuid,
    pub scan_point_id: Uuid,
    pub business_id: Uuid,
    pub rank_position: i32,
    pub result_type: ResultType,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    Google,
    Bing,
}

impl ReviewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewSource::Google => "google",
            ReviewSource::Bing => "bing",
        }
    }

    /// The review source an engine's ratings belong to.
    pub fn for_engine(engine_id: &str) -> Self {
        if engine_id.starts_with("bing") {
            ReviewSource::Bing
        } else {
            ReviewSource::Google
        }
    }
}

impl std::str::FromStr for ReviewSource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "bing" => Ok(Self::Bing),
            other => Err(format!("unknown ReviewSource: {other}")),
        }
    }
}

/// Append-only rating/review-count time series entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub id: Uuid,
    pub business_id: Uuid,
    pub source: ReviewSource,
    pub rating: f64,
    pub review_count: i32,
    pub captured_at: DateTime<Utc>,
}

// --- Store write parameters ---

/// Fields for a business row created on first sighting.
#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub name: String,
    pub normalized_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
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
}

/// Field updates applied to an existing business on a match.
///
/// `phone` and the rating fields overwrite when Some; `website`, place ids,
/// and coordinates only fill columns that are currently null.
#[derive(Debug, Clone, Default)]
pub struct BusinessMerge {
    pub phone: Option<String>,
    pub website: Option<String>,
    pub google_place_id: Option<String>,
    pub bing_place_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub google_rating: Option<f64>,
    pub google_review_count: Option<i32>,
    pub bing_rating: Option<f64>,
    pub bing_review_count: Option<i32>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub service_area_id: Uuid,
    pub category_id: Uuid,
    pub keyword: String,
    pub engine_id: String,
    pub grid_size: i32,
    pub radius_miles: f64,
    pub points_total: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewRanking {
    pub scan_point_id: Uuid,
    pub business_id: Uuid,
    pub rank_position: i32,
    pub result_type: ResultType,
    pub snippet: Option<String>,
}

// --- Schedules ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSchedule {
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

// --- Engine output contract ---

/// SERP section a result was parsed out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    LocalPack,
    Organic,
    Maps,
    LocalFinder,
    KnowledgePanel,
    PeopleAlsoAsk,
    RelatedSearches,
    Ads,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::LocalPack => "local_pack",
            ResultType::Organic => "organic",
            ResultType::Maps => "maps",
            ResultType::LocalFinder => "local_finder",
            ResultType::KnowledgePanel => "knowledge_panel",
            ResultType::PeopleAlsoAsk => "people_also_ask",
            ResultType::RelatedSearches => "related_searches",
            ResultType::Ads => "ads",
        }
    }
}

impl std::str::FromStr for ResultType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local_pack" => Ok(Self::LocalPack),
            "organic" => Ok(Self::Organic),
            "maps" => Ok(Self::Maps),
            "local_finder" => Ok(Self::LocalFinder),
            "knowledge_panel" => Ok(Self::KnowledgePanel),
            "people_also_ask" => Ok(Self::PeopleAlsoAsk),
            "related_searches" => Ok(Self::RelatedSearches),
            "ads" => Ok(Self::Ads),
            other => Err(format!("unknown ResultType: {other}")),
        }
    }
}

/// A business listing as parsed from one engine response. `rank_position`
/// is 1-based and meaningful within the list it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedBusiness {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub google_place_id: Option<String>,
    pub bing_place_id: Option<String>,
    pub result_type: ResultType,
    pub rank_position: i32,
    pub snippet: Option<String>,
}

impl ParsedBusiness {
    /// A listing with only the fields every engine can produce.
    pub fn minimal(name: &str, result_type: ResultType, rank_position: i32) -> Self {
        Self {
            name: name.to_string(),
            address: None,
            city: None,
            state: None,
            phone: None,
            website: None,
            lat: None,
            lng: None,
            rating: None,
            review_count: None,
            google_place_id: None,
            bing_place_id: None,
            result_type,
            rank_position,
            snippet: None,
        }
    }
}

/// A plain organic result (no business entity attached).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicResult {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
    pub rank_position: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub captcha_detected: bool,
    pub response_time_ms: u64,
    pub parser_version: String,
    pub proxy_used: bool,
}

/// The common output contract every engine produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub engine_id: String,
    pub query: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
    pub businesses: Vec<ParsedBusiness>,
    pub organic_results: Vec<OrganicResult>,
    pub metadata: SearchMetadata,
}

impl SearchResult {
    /// An empty result for a blocked or unparseable response.
    pub fn empty(engine_id: &str, query: &str, location: GeoPoint, metadata: SearchMetadata) -> Self {
        Self {
            engine_id: engine_id.to_string(),
            query: query.to_string(),
            location,
            timestamp: Utc::now(),
            businesses: Vec::new(),
            organic_results: Vec::new(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn scan_status_round_trips() {
        for s in [
            ScanStatus::Pending,
            ScanStatus::Queued,
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert_eq!(ScanStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(!ScanStatus::Queued.is_terminal());
    }

    #[test]
    fn review_source_by_engine_prefix() {
        assert_eq!(ReviewSource::for_engine("bing_api"), ReviewSource::Bing);
        assert_eq!(ReviewSource::for_engine("bing_local"), ReviewSource::Bing);
        assert_eq!(ReviewSource::for_engine("google_search"), ReviewSource::Google);
        assert_eq!(ReviewSource::for_engine("duckduckgo"), ReviewSource::Google);
    }

    #[test]
    fn result_type_wire_names() {
        assert_eq!(ResultType::LocalPack.as_str(), "local_pack");
        let json = serde_json::to_string(&ResultType::LocalFinder).unwrap();
        assert_eq!(json, "\"local_finder\"");
    }
}
