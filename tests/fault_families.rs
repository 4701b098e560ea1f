//! One apply/recover round trip per fault family, checked against the
//! state the simulated agents end up in.

mod common;

use chaos_mesh::actions::{
    Action, CpuStressor, DnsParams, DnsScope, IoParams, StressParams, Stressors, TimeParams,
};
use chaos_mesh::chaos::podfailure::image_annotation;
use chaos_mesh::chaos::podnotready::NOT_READY_CONDITION;
use chaos_mesh::orchestrator::FinalizerKey;
use chaos_mesh::selector::NamespacePolicy;
use chaos_mesh::store::memory::fixtures;
use chaos_mesh::store::PodExt;
use chaos_mesh::{ChaosKind, Phase, PodMode};
use common::{at, chaos, container_of, key, Harness, DNS_SERVER};

#[tokio::test]
async fn test_time_offset_with_clock_mask() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::TimeChaos,
        "skew",
        Action::TimeOffset(TimeParams {
            time_offset: "-5m".into(),
            clock_ids: vec!["CLOCK_REALTIME".into(), "CLOCK_MONOTONIC".into()],
        }),
        PodMode::One,
    ));
    let container = container_of("web-0");

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(h.daemon.time_offset(&container), Some((-300, 0, 3)));

    h.delete(&c, at(8, 5));
    h.reconcile(&c, at(8, 5)).await;
    assert_eq!(h.daemon.time_offset(&container), None);
}

#[tokio::test]
async fn test_unknown_clock_id_is_rejected() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::TimeChaos,
        "bad-clock",
        Action::TimeOffset(TimeParams {
            time_offset: "1h".into(),
            clock_ids: vec!["CLOCK_SUNDIAL".into()],
        }),
        PodMode::One,
    ));

    let err = h.try_reconcile(&c, at(8, 0)).await.unwrap_err();
    assert!(err.to_string().contains("CLOCK_SUNDIAL"), "{}", err);
    assert!(h.daemon.calls().is_empty());
}

#[tokio::test]
async fn test_pod_failure_swaps_and_restores_images() {
    println!("[TEST] pod-failure replaces the image and restores it on recovery");
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(ChaosKind::PodChaos, "fail", Action::PodFailure, PodMode::One));
    let pod_key = key("default", "web-0");

    h.reconcile(&c, at(8, 0)).await;
    let pod = h.store.pod(&pod_key).unwrap();
    let image = pod.spec.as_ref().unwrap().containers[0].image.clone();
    assert_eq!(image.as_deref(), Some(chaos_mesh::chaos::DEFAULT_POD_FAILURE_IMAGE));
    let annotation = image_annotation("fail", "pod-failure", "app");
    assert_eq!(
        pod.metadata.annotations.as_ref().and_then(|a| a.get(&annotation)).map(String::as_str),
        Some("nginx")
    );

    h.delete(&c, at(8, 5));
    let finished = h.reconcile(&c, at(8, 5)).await;
    assert_eq!(finished.phase, Some(Phase::Finished));
    // Restored, then deleted so the controller re-creates it.
    assert!(h.store.pod(&pod_key).is_none());
    assert_eq!(h.store.deleted_pods(), vec![pod_key]);
    println!("[TEST] ✓ pod-failure recovered");
}

#[tokio::test]
async fn test_pod_not_ready_flips_readiness_gate() {
    let h = Harness::new();
    h.store.insert_pod(
        fixtures::pod("default", "web-0")
            .label("app", "web")
            .node("node-0")
            .ip("10.0.0.10")
            .container("app", "nginx", &container_of("web-0"))
            .readiness_gate(NOT_READY_CONDITION)
            .build(),
    );
    let c = h.create(chaos(ChaosKind::PodChaos, "unready", Action::PodNotReady, PodMode::One));
    let pod_key = key("default", "web-0");

    let condition = |h: &Harness| {
        h.store
            .pod(&pod_key)
            .and_then(|p| p.status)
            .and_then(|s| s.conditions)
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.type_ == NOT_READY_CONDITION)
            .map(|c| c.status)
    };

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(condition(&h).as_deref(), Some("True"));

    h.delete(&c, at(8, 5));
    h.reconcile(&c, at(8, 5)).await;
    assert_eq!(condition(&h), None);
    assert!(h.store.pod(&pod_key).is_some());
}

#[tokio::test]
async fn test_container_kill() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(ChaosKind::PodChaos, "kill-c", Action::ContainerKill, PodMode::All));

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(h.daemon.killed(), vec![container_of("web-0")]);

    h.delete(&c, at(8, 1));
    assert_eq!(h.reconcile(&c, at(8, 1)).await.phase, Some(Phase::Finished));
    assert_eq!(h.daemon.killed().len(), 1);
}

#[tokio::test]
async fn test_io_errno_programs_fault_server() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::IoChaos,
        "eio",
        Action::IoErrno(IoParams {
            errno: Some(5),
            percent: 100,
            ..Default::default()
        }),
        PodMode::One,
    ));

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(h.faults.addresses(), vec!["10.0.0.10:65534".to_string()]);
    let server = h.faults.server("10.0.0.10:65534");
    assert!(server.registry().is_injected());
    let decision = server.registry().decide("read", "/var/lib/data").unwrap();
    assert_eq!(decision.errno, Some(5));

    h.delete(&c, at(8, 5));
    h.reconcile(&c, at(8, 5)).await;
    assert!(!server.registry().is_injected());
}

#[tokio::test]
async fn test_io_config_name_annotates_namespace() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::IoChaos,
        "sidecar",
        Action::IoDelay(IoParams {
            delay: Some("10ms".into()),
            addr: Some(":9000".into()),
            config_name: Some("chaosfs-web".into()),
            ..Default::default()
        }),
        PodMode::One,
    ));

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(
        h.store
            .namespace_annotations("default")
            .get(chaos_mesh::models::ANNOTATION_WEBHOOK_REQUEST)
            .map(String::as_str),
        Some("chaosfs-web")
    );
    let decision = h
        .faults
        .server("10.0.0.10:9000")
        .registry()
        .decide("write", "/data")
        .unwrap();
    assert_eq!(decision.delay, std::time::Duration::from_millis(10));
    assert_eq!(decision.errno, None);
}

#[tokio::test]
async fn test_dns_error_redirects_resolver() {
    println!("[TEST] dns-error registers a rule and points the resolver at it");
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::DnsChaos,
        "nxdomain",
        Action::DnsError(DnsParams {
            patterns: vec!["google.com".into(), "chaos-mesh.*".into()],
            scope: DnsScope::All,
        }),
        PodMode::One,
    ));
    let pod = key("default", "web-0");
    let container = container_of("web-0");

    h.reconcile(&c, at(8, 0)).await;
    assert_eq!(h.daemon.dns_server(&container).as_deref(), Some(DNS_SERVER));
    assert_eq!(h.dns.resolve_action(&pod, "google.com").as_deref(), Some("error"));
    assert_eq!(h.dns.resolve_action(&pod, "chaos-mesh.org").as_deref(), Some("error"));
    assert_eq!(h.dns.resolve_action(&pod, "example.com"), None);
    assert_eq!(h.dns.rules()[0].name, "default_nxdomain");

    h.delete(&c, at(8, 5));
    h.reconcile(&c, at(8, 5)).await;
    assert!(h.dns.rules().is_empty());
    assert_eq!(h.daemon.dns_server(&container), None);
    println!("[TEST] ✓ dns chaos lifted");
}

#[tokio::test]
async fn test_stress_instance_is_tracked_in_finalizer() {
    let h = Harness::new();
    h.add_pod("default", "web-0", "10.0.0.10");
    let c = h.create(chaos(
        ChaosKind::StressChaos,
        "burn",
        Action::Stress(StressParams {
            stressors: Some(Stressors {
                cpu: Some(CpuStressor {
                    workers: 2,
                    load: Some(50),
                    methods: Vec::new(),
                }),
                memory: None,
            }),
            stressng_stressors: None,
        }),
        PodMode::One,
    ));

    h.reconcile(&c, at(8, 0)).await;
    let stored = h.stored(&c).unwrap();
    let finalizers = stored.metadata.finalizers.to_vec();
    assert_eq!(finalizers.len(), 1);
    let parsed = FinalizerKey::parse(&finalizers[0], false).unwrap();
    assert_eq!(parsed.pod, key("default", "web-0"));
    let instance = parsed.instance.expect("instance suffix");

    assert_eq!(h.daemon.running_stressors(), vec![instance.clone()]);
    assert_eq!(stored.status.instances["default/web-0"].uid, instance);
    assert_eq!(
        h.daemon.calls_for("ExecStressors")[0].detail,
        "--cpu 2 --cpu-load 50"
    );

    h.delete(&c, at(8, 5));
    h.reconcile(&c, at(8, 5)).await;
    assert!(h.daemon.running_stressors().is_empty());
}

#[tokio::test]
async fn test_allow_list_limits_targets() {
    println!("[TEST] namespace allow-list end to end");
    let h = Harness::with_policy(NamespacePolicy::new("allow", "").unwrap());
    let namespaces = ["allow", "allow-app", "app-allow", "ignore", "ignore-app", "app-ignore"];
    for (i, ns) in namespaces.iter().enumerate() {
        h.add_pod(ns, "web-0", &format!("10.0.1.{}", i + 1));
    }
    let c = h.create(chaos(
        ChaosKind::TimeChaos,
        "allowed-only",
        Action::TimeOffset(TimeParams::new("1h")),
        PodMode::All,
    ));

    h.reconcile(&c, at(8, 0)).await;
    let mut targeted: Vec<String> = h
        .stored(&c)
        .unwrap()
        .status
        .pod_records
        .iter()
        .map(|r| r.namespace.clone())
        .collect();
    targeted.sort();
    assert_eq!(targeted, vec!["allow", "allow-app", "app-allow"]);
    println!("[TEST] ✓ only allowed namespaces were targeted");
}

#[tokio::test]
async fn test_fixed_mode_picks_exact_count() {
    let h = Harness::new();
    for i in 0..5 {
        h.add_pod("default", &format!("web-{}", i), &format!("10.0.0.{}", 10 + i));
    }
    let mut c = chaos(
        ChaosKind::TimeChaos,
        "three",
        Action::TimeOffset(TimeParams::new("1h")),
        PodMode::Fixed,
    );
    c.spec.value = Some("3".into());
    let c = h.create(c);

    h.reconcile(&c, at(8, 0)).await;
    let stored = h.stored(&c).unwrap();
    assert_eq!(stored.status.pod_records.len(), 3);
    assert_eq!(stored.metadata.finalizers.len(), 3);
    for record in &stored.status.pod_records {
        let pod = h.store.pod(&key(&record.namespace, &record.name)).unwrap();
        assert_eq!(record.uid, pod.uid());
        assert_eq!(record.pod_ip, pod.pod_ip());
    }
}
