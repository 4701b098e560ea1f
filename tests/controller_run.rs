//! The controller run loop: resync, requeue and shutdown.

mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use chaos_mesh::actions::{PodKillParams, TimeParams};
use chaos_mesh::daemon::{RecordingConnector, RecordingDaemon};
use chaos_mesh::dns::RecordingDnsClient;
use chaos_mesh::faultserver::LocalFaultServerConnector;
use chaos_mesh::models::SchedulerSpec;
use chaos_mesh::{
    Action, ChaosController, ChaosKind, ControllerConfig, EventKind, LogEventRecorder, Phase, PodMode,
};
use common::{chaos, container_of, key, Harness};

fn config() -> ControllerConfig {
    ControllerConfig {
        watched_kinds: vec![ChaosKind::PodChaos],
        resync_period_secs: 5,
        ..Default::default()
    }
}

fn pod_kill() -> chaos_mesh::ChaosObject {
    chaos(
        ChaosKind::PodChaos,
        "kill",
        Action::PodKill(PodKillParams { grace_period: 0 }),
        PodMode::One,
    )
}

/// Poll `check` on the paused clock until it holds or `limit` elapses.
async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < limit {
        if check() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    check()
}

#[tokio::test(start_paused = true)]
async fn test_run_injects_recovers_and_stops() {
    println!("[TEST] pod-kill driven by the run loop");
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(pod_kill());

    let controller = ChaosController::new(h.reconciler.clone(), h.store.clone(), &config());
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(rx).await });

    let store = h.store.clone();
    assert!(eventually(Duration::from_secs(10), || !store.deleted_pods().is_empty()).await);
    assert_eq!(store.deleted_pods(), vec![key("default", "web-0")]);
    assert_eq!(h.stored(&c).unwrap().status.phase, Phase::Running);

    // The next resync sees the deletion.
    h.delete(&c, Utc::now());
    assert!(eventually(Duration::from_secs(30), || h.stored(&c).is_none()).await);
    assert_eq!(
        h.events.events_for(&c.key()),
        vec![EventKind::ChaosInjected, EventKind::ChaosRecovered]
    );

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    println!("[TEST] ✓ controller stopped cleanly");
}

#[tokio::test(start_paused = true)]
async fn test_schedule_overrun_stays_failed_across_resyncs() {
    println!("[TEST] a window that never closes halts the experiment");
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    // More firings fit inside one window than the walk allows.
    let mut overrun = chaos(
        ChaosKind::TimeChaos,
        "overrun",
        Action::TimeOffset(TimeParams::new("-10m")),
        PodMode::One,
    );
    overrun.spec.scheduler = Some(SchedulerSpec {
        cron: "@every 1m".to_string(),
    });
    overrun.spec.duration = Some("170h".to_string());
    let c = h.create(overrun);

    let watched = ControllerConfig {
        watched_kinds: vec![ChaosKind::TimeChaos],
        ..config()
    };
    let controller = ChaosController::new(h.reconciler.clone(), h.store.clone(), &watched);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(rx).await });

    assert!(eventually(Duration::from_secs(10), || h.stored(&c).map_or(false, |s| s.status.halted)).await);
    // Several resync periods go by.
    tokio::time::sleep(Duration::from_secs(30)).await;

    let stored = h.stored(&c).unwrap();
    assert_eq!(stored.status.phase, Phase::Failed);
    assert!(stored.status.halted);
    assert!(stored.status.failed_message.is_some());
    assert!(h.daemon.calls_for("SetTimeOffset").is_empty());
    assert!(h.daemon.time_offset(&container_of("web-0")).is_none());

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    println!("[TEST] ✓ no injection after the overrun");
}

#[tokio::test(start_paused = true)]
async fn test_namespace_scope_hides_other_namespaces() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(pod_kill());

    let scoped = ControllerConfig {
        cluster_scoped: false,
        target_namespace: "staging".to_string(),
        ..config()
    };
    let controller = ChaosController::new(h.reconciler.clone(), h.store.clone(), &scoped);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(rx).await });

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(h.store.deleted_pods().is_empty());
    assert_eq!(h.stored(&c).unwrap().status.phase, Phase::Uninitialized);

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sender_stops_the_loop() {
    let h = Harness::new();
    let controller = ChaosController::new(h.reconciler.clone(), h.store.clone(), &config());
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(rx).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(tx);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconcile_once_without_object() {
    let h = Harness::new();
    let controller = ChaosController::new(h.reconciler.clone(), h.store.clone(), &config());
    let reconciled = controller
        .reconcile_once(ChaosKind::PodChaos, &key("default", "missing"))
        .await
        .unwrap();
    assert_eq!(reconciled.phase, None);
    assert_eq!(reconciled.requeue_after, None);
}

#[test]
fn test_from_config_rejects_bad_namespace_pattern() {
    let daemon = Arc::new(RecordingDaemon::new());
    let build = |config: &ControllerConfig| {
        ChaosController::from_config(
            config,
            Arc::new(chaos_mesh::MemoryStore::new()),
            Arc::new(RecordingConnector::new(Arc::clone(&daemon))),
            Arc::new(LocalFaultServerConnector::new()),
            Arc::new(RecordingDnsClient::new()),
            Arc::new(LogEventRecorder::default()),
        )
    };

    assert!(build(&config()).is_ok());
    let broken = ControllerConfig {
        allowed_namespaces: "app-(".to_string(),
        ..config()
    };
    assert!(build(&broken).is_err());
}
