//! Business entity resolution.
//!
//! A cascade of match tiers runs against the deduplicated business table;
//! the first tier that hits wins. Phone equality outranks coincident names
//! without a phone — two listings sharing a number are the same business
//! even when their pins disagree.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use gridrank_common::geo::haversine_distance_miles;
use gridrank_common::normalize::{normalize_domain, normalize_name, normalize_phone};
use gridrank_common::types::ParsedBusiness;

use crate::traits::{BusinessMerge, BusinessStore, NewBusiness};

/// Name+coordinate matches must land within 50 meters.
const NAME_MATCH_MAX_MILES: f64 = 0.031;

/// Fuzzy-name phone matches tolerate this much edit distance.
const PHONE_FUZZY_MAX_EDITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Exact google place id equality.
    PlaceId,
    /// Normalized phone equality.
    Phone,
    /// Same normalized name within 50 m.
    NameProximity,
    /// Same phone with a near-identical name.
    PhoneFuzzyName,
    /// Same website domain in the same city.
    DomainCity,
    /// No tier hit — a new business was created.
    Created,
}

impl MatchType {
    pub fn confidence(&self) -> u8 {
        match self {
            MatchType::PlaceId => 100,
            MatchType::Phone => 90,
            MatchType::NameProximity => 95,
            MatchType::PhoneFuzzyName => 85,
            MatchType::DomainCity => 80,
            MatchType::Created => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub business_id: Uuid,
    pub confidence: u8,
    pub match_type: MatchType,
    pub created_new: bool,
}

pub struct BusinessMatcher {
    businesses: Arc<dyn BusinessStore>,
}

impl BusinessMatcher {
    pub fn new(businesses: Arc<dyn BusinessStore>) -> Self {
        Self { businesses }
    }

    /// Resolve a parsed listing to a business id, creating the business on a
    /// full cascade miss. Matched businesses get `last_seen_at` advanced and
    /// selected fields merged.
    pub async fn resolve(
        &self,
        parsed: &ParsedBusiness,
        engine_id: &str,
        category_id: Option<Uuid>,
    ) -> Result<MatchOutcome> {
        let normalized_name = normalize_name(&parsed.name);
        let phone = parsed.phone.as_deref().and_then(normalize_phone);
        let domain = parsed.website.as_deref().and_then(normalize_domain);

        if let Some(hit) = self.find_match(parsed, &normalized_name, &phone, &domain).await? {
            let (business_id, match_type) = hit;
            self.businesses
                .merge_business(business_id, self.build_merge(parsed, engine_id, &phone))
                .await?;
            debug!(
                business_id = %business_id,
                match_type = ?match_type,
                name = %parsed.name,
                "Business matched"
            );
            return Ok(MatchOutcome {
                business_id,
                confidence: match_type.confidence(),
                match_type,
                created_new: false,
            });
        }

        let business = self
            .businesses
            .insert_business(self.build_new(parsed, engine_id, category_id, normalized_name, phone))
            .await?;
        info!(business_id = %business.id, name = %business.name, "New business created");

        Ok(MatchOutcome {
            business_id: business.id,
            confidence: MatchType::Created.confidence(),
            match_type: MatchType::Created,
            created_new: true,
        })
    }

    async fn find_match(
        &self,
        parsed: &ParsedBusiness,
        normalized_name: &str,
        phone: &Option<String>,
        domain: &Option<String>,
    ) -> Result<Option<(Uuid, MatchType)>> {
        // Tier 1: google place id
        if let Some(place_id) = &parsed.google_place_id {
            if let Some(existing) = self.businesses.find_by_google_place_id(place_id).await? {
                return Ok(Some((existing.id, MatchType::PlaceId)));
            }
        }

        // Tier 2: phone equality
        if let Some(phone) = phone {
            if let Some(existing) = self.businesses.find_by_phone(phone).await?.first() {
                return Ok(Some((existing.id, MatchType::Phone)));
            }
        }

        // Tier 3: same normalized name within 50 m
        if let (Some(lat), Some(lng)) = (parsed.lat, parsed.lng) {
            if !normalized_name.is_empty() {
                let candidates = self
                    .businesses
                    .find_by_normalized_name(normalized_name)
                    .await?;
                for candidate in candidates {
                    if let (Some(c_lat), Some(c_lng)) = (candidate.lat, candidate.lng) {
                        if haversine_distance_miles(lat, lng, c_lat, c_lng) < NAME_MATCH_MAX_MILES {
                            return Ok(Some((candidate.id, MatchType::NameProximity)));
                        }
                    }
                }
            }
        }

        // Tier 3.5: phone match with a near-identical name
        if let Some(phone) = phone {
            let candidates = self.businesses.find_by_phone(phone).await?;
            for candidate in candidates {
                if strsim::levenshtein(normalized_name, &candidate.normalized_name)
                    <= PHONE_FUZZY_MAX_EDITS
                {
                    return Ok(Some((candidate.id, MatchType::PhoneFuzzyName)));
                }
            }
        }

        // Tier 4: same website domain in the same city
        if let (Some(domain), Some(city)) = (domain, &parsed.city) {
            let candidates = self.businesses.find_by_domain(domain).await?;
            for candidate in candidates {
                if candidate
                    .city
                    .as_deref()
                    .map(|c| c.eq_ignore_ascii_case(city))
                    .unwrap_or(false)
                {
                    return Ok(Some((candidate.id, MatchType::DomainCity)));
                }
            }
        }

        Ok(None)
    }

    fn build_merge(
        &self,
        parsed: &ParsedBusiness,
        engine_id: &str,
        phone: &Option<String>,
    ) -> BusinessMerge {
        let bing = engine_id.starts_with("bing");

        let mut merge = BusinessMerge {
            // Bing phone formats have proven unreliable; keep the number we have
            phone: if bing { None } else { phone.clone() },
            website: parsed.website.clone(),
            google_place_id: parsed.google_place_id.clone(),
            bing_place_id: parsed.bing_place_id.clone(),
            lat: parsed.lat,
            lng: parsed.lng,
            last_seen_at: Some(Utc::now()),
            ..Default::default()
        };

        if bing {
            merge.bing_rating = parsed.rating;
            merge.bing_review_count = parsed.review_count;
        } else {
            merge.google_rating = parsed.rating;
            merge.google_review_count = parsed.review_count;
        }
        merge
    }

    fn build_new(
        &self,
        parsed: &ParsedBusiness,
        engine_id: &str,
        category_id: Option<Uuid>,
        normalized_name: String,
        phone: Option<String>,
    ) -> NewBusiness {
        let bing = engine_id.starts_with("bing");
        NewBusiness {
            name: parsed.name.clone(),
            normalized_name,
            address: parsed.address.clone(),
            city: parsed.city.clone(),
            state: parsed.state.clone(),
            phone,
            website: parsed.website.clone(),
            google_place_id: parsed.google_place_id.clone(),
            bing_place_id: parsed.bing_place_id.clone(),
            lat: parsed.lat,
            lng: parsed.lng,
            category_id,
            google_rating: if bing { None } else { parsed.rating },
            google_review_count: if bing { None } else { parsed.review_count },
            bing_rating: if bing { parsed.rating } else { None },
            bing_review_count: if bing { parsed.review_count } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use gridrank_common::types::ResultType;

    fn parsed(name: &str) -> ParsedBusiness {
        ParsedBusiness::minimal(name, ResultType::LocalPack, 1)
    }

    #[tokio::test]
    async fn creates_new_business_on_cascade_miss() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut listing = parsed("Joe's Pizza, LLC");
        listing.phone = Some("(561) 555-1234".to_string());

        let outcome = matcher.resolve(&listing, "google_search", None).await.unwrap();
        assert!(outcome.created_new);
        assert_eq!(outcome.match_type, MatchType::Created);
        assert_eq!(outcome.confidence, 0);

        let business = store.get_business(outcome.business_id).await.unwrap().unwrap();
        assert_eq!(business.normalized_name, "joes pizza");
        assert_eq!(business.phone.as_deref(), Some("+15615551234"));
        assert_eq!(business.google_rating, None);
    }

    #[tokio::test]
    async fn resolving_twice_is_stable() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut listing = parsed("Joe's Pizza");
        listing.phone = Some("(561) 555-1234".to_string());

        let first = matcher.resolve(&listing, "google_search", None).await.unwrap();
        let before = store.get_business(first.business_id).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let second = matcher.resolve(&listing, "google_search", None).await.unwrap();
        assert_eq!(first.business_id, second.business_id);
        assert!(!second.created_new);

        let after = store.get_business(first.business_id).await.unwrap().unwrap();
        assert_eq!(after.first_seen_at, before.first_seen_at);
        assert!(after.last_seen_at > before.last_seen_at);
    }

    #[tokio::test]
    async fn place_id_outranks_phone() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        // B1 carries the place id; B2 carries the phone
        let mut b1 = parsed("Joe's Pizza, LLC");
        b1.google_place_id = Some("PX".to_string());
        let b1 = matcher.resolve(&b1, "google_search", None).await.unwrap();

        let mut b2 = parsed("Someone Else");
        b2.phone = Some("(561) 555-9999".to_string());
        let b2 = matcher.resolve(&b2, "google_search", None).await.unwrap();

        let mut listing = parsed("Joe's Pizza");
        listing.google_place_id = Some("PX".to_string());
        listing.phone = Some("(561) 555-9999".to_string());

        let outcome = matcher.resolve(&listing, "google_search", None).await.unwrap();
        assert_eq!(outcome.business_id, b1.business_id);
        assert_ne!(outcome.business_id, b2.business_id);
        assert_eq!(outcome.match_type, MatchType::PlaceId);
        assert_eq!(outcome.confidence, 100);
    }

    #[tokio::test]
    async fn phone_matches_across_engines() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut seeded = parsed("Joe's Pizza, LLC");
        seeded.google_place_id = Some("PX".to_string());
        seeded.phone = Some("+15615551234".to_string());
        let seeded = matcher.resolve(&seeded, "google_search", None).await.unwrap();

        // Same place id from another google surface: tier 1
        let mut by_place = parsed("Joe's Pizza");
        by_place.google_place_id = Some("PX".to_string());
        let outcome = matcher.resolve(&by_place, "google_search", None).await.unwrap();
        assert_eq!(outcome.match_type, MatchType::PlaceId);
        assert_eq!(outcome.business_id, seeded.business_id);

        // No place id from bing, but the phone lines up: tier 2
        let mut by_phone = parsed("Joe's Pizza");
        by_phone.phone = Some("(561) 555-1234".to_string());
        let outcome = matcher.resolve(&by_phone, "bing_api", None).await.unwrap();
        assert_eq!(outcome.match_type, MatchType::Phone);
        assert_eq!(outcome.confidence, 90);
        assert_eq!(outcome.business_id, seeded.business_id);
    }

    #[tokio::test]
    async fn name_proximity_matches_within_fifty_meters() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut seeded = parsed("Joe's Pizza");
        seeded.lat = Some(26.4615);
        seeded.lng = Some(-80.0728);
        let seeded = matcher.resolve(&seeded, "google_search", None).await.unwrap();

        // ~30 m north — same business
        let mut near = parsed("Joe's Pizza LLC");
        near.lat = Some(26.46177);
        near.lng = Some(-80.0728);
        let outcome = matcher.resolve(&near, "google_search", None).await.unwrap();
        assert_eq!(outcome.match_type, MatchType::NameProximity);
        assert_eq!(outcome.business_id, seeded.business_id);

        // ~2 km away — different business
        let mut far = parsed("Joe's Pizza");
        far.lat = Some(26.4795);
        far.lng = Some(-80.0728);
        let outcome = matcher.resolve(&far, "google_search", None).await.unwrap();
        assert!(outcome.created_new);
    }

    #[tokio::test]
    async fn domain_and_city_match() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut seeded = parsed("Joe's Pizza");
        seeded.website = Some("https://www.joespizza.com".to_string());
        seeded.city = Some("Delray Beach".to_string());
        let seeded = matcher.resolve(&seeded, "google_search", None).await.unwrap();

        let mut listing = parsed("Joes Pizza Restaurant");
        listing.website = Some("http://joespizza.com/menu".to_string());
        listing.city = Some("DELRAY BEACH".to_string());
        let outcome = matcher.resolve(&listing, "bing_api", None).await.unwrap();
        assert_eq!(outcome.match_type, MatchType::DomainCity);
        assert_eq!(outcome.confidence, 80);
        assert_eq!(outcome.business_id, seeded.business_id);
    }

    #[tokio::test]
    async fn bing_engines_never_merge_phone() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut seeded = parsed("Joe's Pizza");
        seeded.google_place_id = Some("PX".to_string());
        let seeded = matcher.resolve(&seeded, "google_search", None).await.unwrap();

        let mut bing_listing = parsed("Joe's Pizza");
        bing_listing.google_place_id = Some("PX".to_string());
        bing_listing.phone = Some("(561) 555-0000".to_string());
        bing_listing.rating = Some(4.2);
        bing_listing.review_count = Some(35);
        matcher.resolve(&bing_listing, "bing_api", None).await.unwrap();

        let business = store.get_business(seeded.business_id).await.unwrap().unwrap();
        assert_eq!(business.phone, None, "bing phone must not merge");
        assert_eq!(business.bing_rating, Some(4.2));
        assert_eq!(business.bing_review_count, Some(35));
        assert_eq!(business.google_rating, None);
    }

    #[tokio::test]
    async fn ratings_route_to_engine_columns_on_create() {
        let store = Arc::new(MemoryStore::new());
        let matcher = BusinessMatcher::new(store.clone());

        let mut listing = parsed("Pete's");
        listing.rating = Some(4.7);
        listing.review_count = Some(120);
        let outcome = matcher.resolve(&listing, "bing_api", None).await.unwrap();

        let business = store.get_business(outcome.business_id).await.unwrap().unwrap();
        assert_eq!(business.bing_rating, Some(4.7));
        assert_eq!(business.bing_review_count, Some(120));
        assert_eq!(business.google_rating, None);
    }
}
