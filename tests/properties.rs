//! Property checks over the lifecycle and its building blocks.

mod common;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use chaos_mesh::actions::{Action, TimeParams};
use chaos_mesh::chaos::ipset::{ipset_name, IPSET_NAME_MAX, SOURCE_POSTFIX};
use chaos_mesh::orchestrator::{iterate_next, transition, CronSchedule, Handler, StateMachine};
use chaos_mesh::selector::mode::filter_by_mode;
use chaos_mesh::{ChaosKind, Phase, PodMode};
use common::{at, chaos, Harness};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn phase() -> impl Strategy<Value = Phase> {
    prop::sample::select(Phase::ALL.to_vec())
}

fn mode() -> impl Strategy<Value = (PodMode, Option<String>)> {
    prop_oneof![
        Just((PodMode::One, None)),
        Just((PodMode::All, None)),
        (1i64..20).prop_map(|n| (PodMode::Fixed, Some(n.to_string()))),
        (1i64..=100).prop_map(|n| (PodMode::FixedPercent, Some(n.to_string()))),
        (1i64..=100).prop_map(|n| (PodMode::RandomMaxPercent, Some(n.to_string()))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// A step from `from` towards `to` ends in `to` or Failed; an
    /// unexpected pair leaves the phase alone.
    #[test]
    fn prop_one_step_phase_legality(from in phase(), to in phase()) {
        // One-shot objects never wait.
        prop_assume!(to != Phase::Waiting && from != Phase::Waiting);

        let h = Harness::new();
        h.add_pod("default", "web-0", "10.0.0.10");
        let mut c = chaos(
            ChaosKind::TimeChaos,
            "step",
            Action::TimeOffset(TimeParams::new("1h")),
            PodMode::One,
        );
        c.status.phase = from;
        c.status.start_time = Some(at(7, 0));
        let mut c = h.create(c);

        let result = runtime().block_on(StateMachine::into(&h.machine, &mut c, to, at(7, 30)));
        match transition(from, to) {
            Handler::Unexpected => {
                prop_assert!(result.is_err());
                prop_assert_eq!(c.status.phase, from);
            }
            _ => {
                prop_assert!(result.is_ok(), "{:?}", result);
                prop_assert!(c.status.phase == to || c.status.phase == Phase::Failed);
            }
        }
    }

    #[test]
    fn prop_mode_stays_within_candidates(
        len in 1usize..40,
        (mode, value) in mode(),
        seed in any::<u64>(),
    ) {
        let items: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = filter_by_mode(items, mode, value.as_deref(), &mut rng).unwrap();

        prop_assert!(picked.len() <= len);
        let mut unique = picked.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(unique.len(), picked.len());
        let n: usize = value.as_deref().map_or(0, |v| v.parse().unwrap());
        match mode {
            PodMode::One => prop_assert_eq!(picked.len(), 1),
            PodMode::All => prop_assert_eq!(picked.len(), len),
            PodMode::Fixed => prop_assert_eq!(picked.len(), n.min(len)),
            PodMode::FixedPercent => prop_assert_eq!(picked.len(), len * n / 100),
            _ => {}
        }
    }

    #[test]
    fn prop_same_seed_same_sample(len in 2usize..30, seed in any::<u64>()) {
        let sample = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            filter_by_mode((0..len).collect::<Vec<_>>(), PodMode::Fixed, Some("2"), &mut rng).unwrap()
        };
        prop_assert_eq!(sample(seed), sample(seed));
    }

    /// The next window starts no earlier than the current one ends.
    #[test]
    fn prop_window_ordering(every_min in 1i64..180, duration_min in 0i64..600, offset_s in 0i64..86_400) {
        let schedule = CronSchedule::parse(&format!("@every {}m", every_min)).unwrap();
        let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_s);
        let duration = Duration::minutes(duration_min);

        let (next_start, next_recover) = iterate_next(Some(&schedule), start, duration).unwrap();
        prop_assert_eq!(next_recover, start + duration);
        prop_assert!(next_start > start);
        prop_assert!(next_start >= next_recover);
        // No firing was skipped that could have hosted the next window.
        prop_assert!(next_start - Duration::minutes(every_min) < next_recover.max(start + Duration::seconds(1)));
    }

    #[test]
    fn prop_ipset_names_fit_kernel_limit(name in "[a-z0-9-]{1,80}") {
        let set = ipset_name(&name, SOURCE_POSTFIX);
        prop_assert!(set.len() <= IPSET_NAME_MAX);
        prop_assert!(set.ends_with("_source"));
    }
}
