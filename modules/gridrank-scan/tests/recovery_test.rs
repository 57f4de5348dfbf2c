//! Restart recovery: orphaned scans get their unfinished points re-queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use gridrank_common::types::{Scan, ScanPoint, ScanPointStatus, ScanStatus};
use gridrank_engines::EngineRegistry;
use gridrank_scan::orchestrator::ScanOrchestrator;
use gridrank_scan::queue::ScanQueue;
use gridrank_scan::testing::{category, listing, service_area, MemoryStore, StubEngine};

fn orphaned_scan(area_id: Uuid, category_id: Uuid, completed: i32) -> Scan {
    Scan {
        id: Uuid::new_v4(),
        service_area_id: area_id,
        category_id,
        keyword: "pizza".to_string(),
        engine_id: "bing_api".to_string(),
        grid_size: 3,
        radius_miles: 1.0,
        status: ScanStatus::Running,
        points_total: 9,
        points_completed: completed,
        error_message: None,
        scheduled_at: None,
        started_at: Some(Utc::now()),
        completed_at: None,
        created_at: Utc::now(),
    }
}

fn point(scan_id: Uuid, row: i32, col: i32, status: ScanPointStatus) -> ScanPoint {
    ScanPoint {
        id: Uuid::new_v4(),
        scan_id,
        grid_row: row,
        grid_col: col,
        lat: 26.4615 + row as f64 * 0.001,
        lng: -80.0728 + col as f64 * 0.001,
        status,
    }
}

#[tokio::test(start_paused = true)]
async fn recovery_requeues_pending_points_and_finishes_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let area_id = store.add_service_area(service_area("Delray Beach"));
    let category_id = store.add_category(category("Pizza"));

    // A scan interrupted mid-flight: 4 of 9 points done, 5 still pending
    let scan = orphaned_scan(area_id, category_id, 4);
    let scan_id = scan.id;
    store.add_scan(scan);
    let mut pending = 0;
    for row in 0..3 {
        for col in 0..3 {
            let done = row * 3 + col < 4;
            let status = if done {
                ScanPointStatus::Completed
            } else {
                pending += 1;
                ScanPointStatus::Pending
            };
            store.add_point(point(scan_id, row, col, status));
        }
    }
    assert_eq!(pending, 5);

    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(
        StubEngine::new("bing_api").returning(vec![listing("Joe's Pizza", 1)]),
    ));
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

    let recovered = orchestrator.recover_orphaned_scans().await.unwrap();
    assert_eq!(recovered, 1);

    for _ in 0..600 {
        if store.scan(scan_id).map(|s| s.status.is_terminal()).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let scan = store.scan(scan_id).unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.points_completed, 9);
    assert!(store
        .points_for_scan(scan_id)
        .iter()
        .all(|p| p.status == ScanPointStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn recovery_finalizes_scans_whose_points_are_all_done() {
    let store = Arc::new(MemoryStore::new());
    let area_id = store.add_service_area(service_area("Delray Beach"));
    let category_id = store.add_category(category("Pizza"));

    // Crashed after the last point but before finalization
    let scan = orphaned_scan(area_id, category_id, 9);
    let scan_id = scan.id;
    store.add_scan(scan);
    for row in 0..3 {
        for col in 0..3 {
            store.add_point(point(scan_id, row, col, ScanPointStatus::Completed));
        }
    }

    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(StubEngine::new("bing_api")));
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

    let recovered = orchestrator.recover_orphaned_scans().await.unwrap();
    assert_eq!(recovered, 0);

    let scan = store.scan(scan_id).unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn recovery_with_nothing_to_do() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(StubEngine::new("bing_api")));
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

    assert_eq!(orchestrator.recover_orphaned_scans().await.unwrap(), 0);
}
