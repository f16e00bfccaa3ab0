//! End-to-end tests: bus monitors, mock drivers and the engine controller
//!
//! Run with: cargo test -p vta-tests --test monitor_e2e

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio_test::assert_ok;
use vta_bus::{
    spawn_monitor, BusController, BusMonitor, BusMonitorConfig, BusMonitorHandle, BusStatus,
    BusType, Dtc, DtcChangeSummary, DtcSnapshot, EngineConfig, EngineController, EngineEvent,
    ManualScheduler, MockBusConfig, MockBusDriver,
};

async fn run_window(
    monitor: &BusMonitorHandle,
    snapshots: &mut broadcast::Receiver<DtcSnapshot>,
) -> DtcSnapshot {
    assert!(monitor.start_collecting().await.unwrap());
    snapshots.recv().await.unwrap()
}

// =============================================================================
// Monitor task + mock driver + engine
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fault_code_lifecycle_through_engine() {
    let engine = Arc::new(EngineController::new(EngineConfig::default()));
    let mut events = engine.subscribe();

    let (monitor, _task) =
        spawn_monitor(BusMonitorConfig::new(BusType::J1939At250k), engine.clone());
    let mut snapshots = monitor.subscribe();
    assert_ok!(monitor.start_liveness_check());

    let _driver = MockBusDriver::new(
        MockBusConfig {
            rx_interval_ms: 100,
            dtcs: vec![0xAB],
            bring_up: true,
            silent_after_ms: Some(15_000),
        },
        monitor.clone(),
    )
    .spawn();

    // First window sees the code while the bus is talking
    let first = run_window(&monitor, &mut snapshots).await;
    assert_eq!(first.codes(), vec![0xAB]);
    assert_eq!(first.summary, DtcChangeSummary::new(1, 0));
    assert_eq!(
        events.recv().await.unwrap(),
        EngineEvent::FaultCodeOn {
            bus: BusType::J1939At250k,
            code: 0xAB
        }
    );

    // Driver went silent at 15 s, so the liveness check has cleared the bus
    assert_eq!(monitor.status().await.unwrap(), BusStatus::UpNoComm);
    assert!(!engine.is_bus_communicating(BusType::J1939At250k));

    // Three empty windows in a row drop the code
    for expected_removed in [0, 0, 1] {
        let snapshot = run_window(&monitor, &mut snapshots).await;
        assert!(snapshot.dtcs.is_empty());
        assert_eq!(snapshot.summary.removed, expected_removed);
    }
    assert_eq!(
        events.recv().await.unwrap(),
        EngineEvent::FaultCodeOff {
            bus: BusType::J1939At250k,
            code: 0xAB
        }
    );
    assert!(engine.current_dtcs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_buses_report_independently() {
    let engine = Arc::new(EngineController::new(EngineConfig::default()));

    let mut handles = Vec::new();
    for (bus, dtcs) in [
        (BusType::J1939At500k, vec![1, 2]),
        (BusType::J1587, vec![2]),
    ] {
        let config = BusMonitorConfig {
            dtc_collection_ms: 2000,
            ..BusMonitorConfig::new(bus)
        };
        let (monitor, _task) = spawn_monitor(config, engine.clone());
        assert_ok!(monitor.start_liveness_check());
        MockBusDriver::new(
            MockBusConfig {
                dtcs,
                ..MockBusConfig::default()
            },
            monitor.clone(),
        )
        .spawn();
        handles.push(monitor);
    }

    for monitor in &handles {
        let mut snapshots = monitor.subscribe();
        run_window(monitor, &mut snapshots).await;
    }

    assert_eq!(engine.buses_communicating(), 0b110);
    let mut current = engine.current_dtcs();
    current.sort_by_key(|&(bus, code)| (bus.raw(), code));
    assert_eq!(
        current,
        vec![
            (BusType::J1939At500k, 1),
            (BusType::J1939At500k, 2),
            (BusType::J1587, 2),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_bus_clears_engine_mask() {
    let engine = Arc::new(EngineController::new(EngineConfig::default()));
    let (monitor, task) = spawn_monitor(BusMonitorConfig::new(BusType::J1587), engine.clone());

    assert_ok!(monitor.report_status(BusStatus::Discovering));
    assert_ok!(monitor.report_status(BusStatus::Up));
    assert_eq!(monitor.status().await.unwrap(), BusStatus::Up);
    assert!(engine.is_bus_communicating(BusType::J1587));

    assert_ok!(monitor.report_status(BusStatus::Failed));
    assert_eq!(monitor.status().await.unwrap(), BusStatus::Failed);
    assert!(!engine.is_bus_communicating(BusType::J1587));

    assert_ok!(monitor.shutdown());
    task.await.unwrap();
    assert!(monitor.add_dtc(Dtc::new(1, 1, 2)).is_err());
}

// =============================================================================
// Synchronous monitor with virtual time
// =============================================================================

#[test]
fn test_manual_clock_window_feeds_engine() {
    let engine = Arc::new(EngineController::new(EngineConfig::default()));
    let mut monitor = BusMonitor::new(
        BusMonitorConfig::new(BusType::J1939At250k),
        ManualScheduler::new(),
        engine.clone() as Arc<dyn BusController>,
    );

    assert!(monitor.start_collecting());
    monitor.add_dtc(Dtc::new(100, 1, 4));
    monitor.advance(Duration::from_millis(5000));
    monitor.add_dtc(Dtc::new(100, 3, 4));
    monitor.advance(Duration::from_millis(1000));
    monitor.add_dtc(Dtc::new(200, 1, 4));
    // Reports with nothing in them are ignored
    monitor.add_dtc(None);

    let snapshots = monitor.advance(Duration::from_millis(14000));
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(
        snapshot.dtcs,
        vec![Dtc::new(100, 3, 4), Dtc::new(200, 1, 4)]
    );
    assert_eq!(snapshot.summary.packed(), 0x0200);
    assert_eq!(
        engine.current_dtcs(),
        vec![(BusType::J1939At250k, 100), (BusType::J1939At250k, 200)]
    );
}
