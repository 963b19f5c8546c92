use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta};
use ulid::Ulid;

use spacebook::building::{Building, BuildingCatalog};
use spacebook::clock::{Clock, ManualClock};
use spacebook::engine::{Engine, EngineConfig, EngineError};
use spacebook::lifecycle::Status;
use spacebook::model::{Event, day_start};
use spacebook::notify::NotifyHub;
use spacebook::scheduler::Scheduler;
use spacebook::store::Store;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("spacebook_test_lifecycle");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

struct Node {
    engine: Arc<Engine>,
    scheduler: Scheduler,
    notify: Arc<NotifyHub>,
}

fn boot(path: &PathBuf, catalog: Arc<BuildingCatalog>, clock: Arc<ManualClock>) -> Node {
    let notify = Arc::new(NotifyHub::new());
    let store = Arc::new(Store::open(path.clone(), notify.clone()).unwrap());
    let engine = Arc::new(Engine::new(store, catalog, clock, EngineConfig::default()));
    let scheduler = Scheduler::new(engine.clone(), Duration::from_secs(86_400));
    Node { engine, scheduler, notify }
}

fn catalog_with(building: Ulid) -> Arc<BuildingCatalog> {
    let catalog = BuildingCatalog::new();
    catalog.insert(Building { id: building, name: "Dockside".into(), published: true });
    Arc::new(catalog)
}

#[tokio::test]
async fn booking_runs_to_completion() {
    let path = wal_path("to_completion.wal");
    let building = Ulid::new();
    let clock = Arc::new(ManualClock::new(day_start(day(2024, 1, 1))));
    let node = boot(&path, catalog_with(building), clock.clone());
    let mut events = node.notify.subscribe(building);

    let tenant = Ulid::new();
    let id = node
        .engine
        .create_reservation(tenant, building, day(2024, 1, 15), 2, "Umbrella")
        .await
        .unwrap();
    node.engine.confirm_payment(id).await.unwrap();

    // Payment window long gone, but the reservation is ACTIVE now.
    clock.set(day_start(day(2024, 2, 1)));
    let report = node.scheduler.run_scan().await.unwrap();
    assert_eq!(report.fired, 0);
    assert_eq!(node.engine.get_reservation(id).await.unwrap().status, Status::Active);

    clock.set(day_start(day(2024, 3, 15)));
    let report = node.scheduler.run_scan().await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(node.engine.get_reservation(id).await.unwrap().status, Status::Completed);

    // The window is free again for someone else.
    assert_eq!(
        node.engine
            .is_available(building, day(2024, 1, 15), day(2024, 3, 15), None)
            .await,
        Ok(true)
    );

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::StatusChanged { to, .. } = event {
            statuses.push(to);
        }
    }
    assert_eq!(statuses, vec![Status::Active, Status::Completed]);
}

#[tokio::test]
async fn restart_rederives_pending_work() {
    let path = wal_path("restart.wal");
    let building = Ulid::new();
    let catalog = catalog_with(building);
    let clock = Arc::new(ManualClock::new(day_start(day(2024, 1, 1))));

    let id = {
        let node = boot(&path, catalog.clone(), clock.clone());
        let id = node
            .engine
            .create_reservation(Ulid::new(), building, day(2024, 2, 1), 3, "Cyberdyne")
            .await
            .unwrap();
        // Armed in memory, then the process "dies".
        assert_eq!(node.scheduler.run_scan().await.unwrap().armed, 1);
        node.scheduler.shutdown();
        id
    };

    clock.advance(TimeDelta::hours(48));
    let node = boot(&path, catalog, clock.clone());
    let before = node.engine.get_reservation(id).await.unwrap();
    assert_eq!(before.status, Status::AwaitingPayment);
    assert!(before.payment_deadline.unwrap() < clock.now());

    let report = node.scheduler.run_scan().await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(node.engine.get_reservation(id).await.unwrap().status, Status::Canceled);
}

#[tokio::test]
async fn double_booking_survives_restart() {
    let path = wal_path("restart_overlap.wal");
    let building = Ulid::new();
    let catalog = catalog_with(building);
    let clock = Arc::new(ManualClock::new(day_start(day(2024, 1, 1))));

    let first = {
        let node = boot(&path, catalog.clone(), clock.clone());
        node.engine
            .create_reservation(Ulid::new(), building, day(2024, 3, 1), 6, "Tyrell")
            .await
            .unwrap()
    };

    let node = boot(&path, catalog, clock);
    let err = node
        .engine
        .create_reservation(Ulid::new(), building, day(2024, 5, 1), 1, "Wallace")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unavailable { building_id: building, conflicting: first });
}

#[tokio::test]
async fn foreign_cancel_leaves_reservation_alone() {
    let path = wal_path("foreign_cancel.wal");
    let building = Ulid::new();
    let clock = Arc::new(ManualClock::new(day_start(day(2024, 1, 1))));
    let node = boot(&path, catalog_with(building), clock);

    let owner = Ulid::new();
    let intruder = Ulid::new();
    let id = node
        .engine
        .create_reservation(owner, building, day(2024, 2, 1), 1, "Soylent")
        .await
        .unwrap();

    assert_eq!(
        node.engine.cancel_reservation(intruder, id).await,
        Err(EngineError::NoPermission { reservation_id: id, tenant_id: intruder })
    );
    assert_eq!(
        node.engine.get_reservation(id).await.unwrap().status,
        Status::AwaitingPayment
    );
    assert!(node.engine.cancel_reservation(owner, id).await.unwrap().applied());
}
