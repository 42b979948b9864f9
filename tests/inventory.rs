//! Origin inventory against live origins: health-driven transitions,
//! membership reloads and the origins bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use origin_dispatch::health::{HttpHealthCheck, OriginHealthMonitor, ScheduledHealthMonitor};
use origin_dispatch::inventory::{
    Changes, ListenerError, OriginState, OriginsBus, OriginsChangeListener, OriginsCommand, OriginsInventory,
    OriginsSnapshot,
};
use origin_dispatch::lifecycle::Shutdown;
use origin_dispatch::origin::{Origin, OriginId};

mod common;

#[derive(Default)]
struct Recorder {
    changes: Mutex<Vec<Changes>>,
}

impl OriginsChangeListener for Recorder {
    fn origins_changed(&self, _snapshot: &OriginsSnapshot, changes: &Changes) -> Result<(), ListenerError> {
        self.changes.lock().unwrap().push(changes.clone());
        Ok(())
    }
}

async fn wait_for_state(inventory: &OriginsInventory, id: &str, state: OriginState) {
    let id = OriginId::new(id);
    tokio::time::timeout(Duration::from_secs(5), async {
        while inventory.state_of(&id) != Some(state) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("origin {id} never became {state}"));
}

#[tokio::test]
async fn health_checks_drive_origin_state() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let addr = common::spawn_router(Router::new().route(
        "/health",
        get(move || {
            let flag = flag.clone();
            async move {
                if flag.load(Ordering::SeqCst) {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }
        }),
    ))
    .await;

    let monitor = Arc::new(ScheduledHealthMonitor::new(
        Arc::new(HttpHealthCheck::new("/health", Duration::from_secs(1))),
        Duration::from_millis(50),
        1,
        2,
    ));
    let shutdown = Shutdown::new();
    tokio::spawn(monitor.clone().run(shutdown.subscribe()));

    let origin = Origin::new("shop", "a", "127.0.0.1", addr.port());
    let inventory = OriginsInventory::builder("shop")
        .health_monitor(monitor.clone() as Arc<dyn OriginHealthMonitor>)
        .initial_origins([origin.clone()])
        .build();
    assert!(monitor.is_monitoring(&origin));

    healthy.store(false, Ordering::SeqCst);
    wait_for_state(&inventory, "a", OriginState::Inactive).await;

    healthy.store(true, Ordering::SeqCst);
    wait_for_state(&inventory, "a", OriginState::Active).await;

    inventory.close();
    assert!(!monitor.is_monitoring(&origin));
    shutdown.trigger();
}

#[tokio::test]
async fn reload_announces_membership_changes() {
    let inventory = OriginsInventory::builder("shop")
        .initial_origins([
            Origin::new("shop", "a", "127.0.0.1", 9000),
            Origin::new("shop", "b", "127.0.0.1", 9001),
        ])
        .build();
    let recorder = Arc::new(Recorder::default());
    inventory.add_listener(recorder.clone());

    inventory.set_origins(&[
        Origin::new("shop", "b", "127.0.0.1", 9001),
        Origin::new("shop", "c", "127.0.0.1", 9002),
    ]);
    // Same membership again: nothing to announce.
    inventory.set_origins(&[
        Origin::new("shop", "b", "127.0.0.1", 9001),
        Origin::new("shop", "c", "127.0.0.1", 9002),
    ]);

    let changes = recorder.changes.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].added.contains(&OriginId::new("c")));
    assert!(changes[0].removed.contains(&OriginId::new("a")));
    assert!(changes[0].updated.is_empty());
}

#[tokio::test]
async fn bus_commands_reach_the_inventory() {
    let bus = Arc::new(OriginsBus::new());
    let mut snapshots = bus.subscribe();
    let inventory = OriginsInventory::builder("shop")
        .bus(bus.clone())
        .initial_origins([Origin::new("shop", "a", "127.0.0.1", 9000)])
        .build();

    assert!(bus.send(OriginsCommand::DisableOrigin {
        app_id: "shop".into(),
        origin_id: "a".into(),
    }));
    assert_eq!(inventory.state_of(&"a".into()), Some(OriginState::Disabled));

    assert!(bus.send(OriginsCommand::GetSnapshot { app_id: "shop".into() }));
    let mut latest = None;
    while let Ok(snapshot) = snapshots.try_recv() {
        latest = Some(snapshot);
    }
    let latest = latest.expect("no snapshot published");
    assert_eq!(latest.state_of(&"a".into()), Some(OriginState::Disabled));

    assert!(!bus.send(OriginsCommand::GetSnapshot { app_id: "cart".into() }));

    inventory.close();
    assert!(!bus.is_registered(&"shop".into()));
}
