//! End-to-end scan flows over the in-memory store and stub engines.

use std::sync::Arc;
use std::time::Duration;

use gridrank_common::types::{ReviewSource, ScanStatus};
use gridrank_engines::EngineRegistry;
use gridrank_scan::orchestrator::{CreateScanRequest, ScanOrchestrator};
use gridrank_scan::queue::ScanQueue;
use gridrank_scan::testing::{category, listing, service_area, MemoryStore, StubEngine};

struct Harness {
    store: Arc<MemoryStore>,
    orchestrator: Arc<ScanOrchestrator>,
    area_id: uuid::Uuid,
    category_id: uuid::Uuid,
}

fn harness(engine: StubEngine) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let area_id = store.add_service_area(service_area("Delray Beach"));
    let category_id = store.add_category(category("Pizza"));

    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(engine));
    let registry = Arc::new(registry);

    let queue = ScanQueue::new(
        registry.clone(),
        ScanOrchestrator::group_daily_total(&registry),
    );
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry,
        queue.clone(),
        7,
    );
    queue.set_handler(orchestrator.clone());

    Harness {
        store,
        orchestrator,
        area_id,
        category_id,
    }
}

async fn wait_for_terminal(store: &MemoryStore, scan_id: uuid::Uuid) -> ScanStatus {
    for _ in 0..600 {
        if let Some(scan) = store.scan(scan_id) {
            if scan.status.is_terminal() {
                return scan.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("scan {scan_id} never reached a terminal state");
}

#[tokio::test(start_paused = true)]
async fn single_scan_happy_path() {
    let mut joes = listing("Joe's Pizza", 1);
    joes.phone = Some("(561) 555-1234".to_string());
    joes.rating = Some(4.7);
    joes.review_count = Some(120);
    let mut petes = listing("Pete's", 2);
    petes.phone = Some("(561) 555-5678".to_string());

    let h = harness(StubEngine::new("bing_api").returning(vec![joes, petes]));

    let scan = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap();

    assert_eq!(scan.points_total, 9);

    let status = wait_for_terminal(&h.store, scan.id).await;
    assert_eq!(status, ScanStatus::Completed);

    let scan = h.store.scan(scan.id).unwrap();
    assert_eq!(scan.points_completed, 9);
    assert!(scan.completed_at.is_some());
    assert!(scan.error_message.is_none());

    // Two listings per point, deduplicated to two business rows
    assert_eq!(h.store.rankings_for_scan(scan.id).len(), 18);
    assert_eq!(h.store.business_count(), 2);

    let businesses = h.store.businesses();
    let joes = businesses
        .iter()
        .find(|b| b.name == "Joe's Pizza")
        .expect("Joe's row");
    let petes = businesses.iter().find(|b| b.name == "Pete's").expect("Pete's row");
    assert_eq!(joes.normalized_name, "joes pizza");
    assert_eq!(joes.phone.as_deref(), Some("+15615551234"));
    assert_eq!(petes.phone.as_deref(), Some("+15615555678"));

    // Joe's carries rating+count → one snapshot per grid point; Pete's none
    let joes_snapshots = h.store.snapshots_for(joes.id);
    assert_eq!(joes_snapshots.len(), 9);
    assert!(joes_snapshots.iter().all(|s| s.source == ReviewSource::Bing));
    assert!(joes_snapshots.iter().all(|s| s.rating == 4.7 && s.review_count == 120));
    assert!(h.store.snapshots_for(petes.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_engine_still_reaches_terminal_state() {
    let engine = StubEngine::new("bing_api");
    engine.set_fail(true);
    let h = harness(engine);

    let scan = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap();

    // Failed points still count toward completion
    let status = wait_for_terminal(&h.store, scan.id).await;
    assert_eq!(status, ScanStatus::Completed);

    let scan = h.store.scan(scan.id).unwrap();
    assert_eq!(scan.points_completed, 9);

    let points = h.store.points_for_scan(scan.id);
    assert!(points
        .iter()
        .all(|p| p.status == gridrank_common::types::ScanPointStatus::Failed));
    assert!(h.store.rankings_for_scan(scan.id).is_empty());
    assert_eq!(h.store.business_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn captcha_results_fail_points_but_scan_terminates() {
    let engine = StubEngine::new("bing_api").returning(vec![listing("Joe's Pizza", 1)]);
    engine.set_captcha(true);
    let h = harness(engine);

    let scan = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap();

    let status = wait_for_terminal(&h.store, scan.id).await;
    assert_eq!(status, ScanStatus::Completed);

    let scan = h.store.scan(scan.id).unwrap();
    assert_eq!(scan.points_completed, 9);
    let points = h.store.points_for_scan(scan.id);
    assert!(points
        .iter()
        .all(|p| p.status == gridrank_common::types::ScanPointStatus::Failed));
    // Blocked cycles never resolve listings
    assert_eq!(h.store.business_count(), 0);
    assert!(h.store.rankings_for_scan(scan.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_results_complete_with_zero_rankings() {
    let h = harness(StubEngine::new("bing_api"));

    let scan = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap();

    let status = wait_for_terminal(&h.store, scan.id).await;
    assert_eq!(status, ScanStatus::Completed);
    assert!(h.store.rankings_for_scan(scan.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_are_rejected() {
    let h = harness(StubEngine::new("bing_api"));

    // Bad grid size
    let err = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(4),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("grid size"));

    // Unknown engine
    let err = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "altavista".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not registered"));

    // Unknown area
    let err = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: uuid::Uuid::new_v4(),
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Service area"));

    // Nothing persisted for any of them
    assert_eq!(h.store.scan_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_scan_stays_cancelled() {
    let h = harness(
        StubEngine::new("bing_api")
            .returning(vec![listing("Joe's Pizza", 1)])
            .with_delay(500),
    );

    let scan = h
        .orchestrator
        .create_scan(CreateScanRequest {
            service_area_id: h.area_id,
            category_id: h.category_id,
            keyword: "pizza".to_string(),
            engine_id: "bing_api".to_string(),
            grid_size: Some(3),
        })
        .await
        .unwrap();

    assert!(h.orchestrator.cancel_scan(scan.id).await.unwrap());

    // Give the queue time to drain the remaining tasks as no-ops
    tokio::time::sleep(Duration::from_secs(10)).await;

    let scan = h.store.scan(scan.id).unwrap();
    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert!(scan.completed_at.is_some());
    // Terminal state is sticky: a second cancel is a no-op
    assert!(!h.orchestrator.cancel_scan(scan.id).await.unwrap());
    // Most points were never worked
    assert!(scan.points_completed < scan.points_total);
}

#[tokio::test(start_paused = true)]
async fn full_scan_expands_combinations() {
    let store = Arc::new(MemoryStore::new());
    let area_id = store.add_service_area(service_area("Delray Beach"));
    let category_id = store.add_category(category("Pizza"));
    store.add_keyword(gridrank_scan::testing::keyword(category_id, "pizza"));
    store.add_keyword(gridrank_scan::testing::keyword(category_id, "pizza delivery"));

    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(StubEngine::new("bing_api")));
    registry.register(Arc::new(StubEngine::new("duckduckgo")));
    let registry = Arc::new(registry);

    let queue = ScanQueue::new(
        registry.clone(),
        ScanOrchestrator::group_daily_total(&registry),
    );
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry,
        queue.clone(),
        7,
    );
    queue.set_handler(orchestrator.clone());

    let scans = orchestrator
        .create_full_scan(gridrank_scan::orchestrator::CreateFullScanRequest {
            service_area_ids: Some(vec![area_id]),
            category_ids: None,
            engine_ids: None,
            grid_size: Some(3),
        })
        .await
        .unwrap();

    // 1 area × 1 category × 2 keywords × 2 engines
    assert_eq!(scans.len(), 4);

    for scan in &scans {
        let status = wait_for_terminal(&store, scan.id).await;
        assert_eq!(status, ScanStatus::Completed);
    }
}
