//! Reconcilers: decide the target phase of one chaos object and hand it to
//! the state machine.
//!
//! One-shot experiments (no scheduler) go through `CommonReconciler`, which
//! applies on first sight and recovers on deletion. Scheduled experiments go
//! through `TwoPhaseReconciler`, which also walks the injection windows and
//! asks to be called again when the next window edge is due.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Result;
use crate::models::{ChaosKind, ChaosObject, ObjectKey};
use crate::orchestrator::machine::StateMachine;
use crate::orchestrator::state::Phase;

/// What a reconcile left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Phase after the step; `None` when the object is gone.
    pub phase: Option<Phase>,
    /// Call again after this delay; `None` waits for the next change.
    pub requeue_after: Option<Duration>,
}

impl Reconciled {
    fn gone() -> Self {
        Reconciled {
            phase: None,
            requeue_after: None,
        }
    }

    fn settled(phase: Phase) -> Self {
        Reconciled {
            phase: Some(phase),
            requeue_after: None,
        }
    }
}

/// Target phase of a one-shot experiment.
pub fn common_target(chaos: &ChaosObject) -> Phase {
    let current = chaos.status.phase;
    if chaos.is_deleted() {
        Phase::Finished
    } else if chaos.is_paused() {
        Phase::Paused
    } else {
        match current {
            Phase::Uninitialized | Phase::Failed | Phase::Paused => Phase::Running,
            other => other,
        }
    }
}

/// Target phase of a scheduled experiment at `now`. Later rules win.
pub fn two_phase_target(chaos: &ChaosObject, now: DateTime<Utc>) -> Phase {
    let status = &chaos.status;
    let mut target = status.phase;

    if status.next_recover.map_or(false, |t| t <= now) {
        target = Phase::Waiting;
    }
    if status.next_start.map_or(true, |t| t <= now) {
        target = Phase::Running;
    }
    if chaos.is_paused() {
        target = Phase::Paused;
    } else if status.phase == Phase::Paused {
        target = Phase::Running;
    }
    if status.halted && status.phase == Phase::Failed {
        target = Phase::Failed;
    }
    if chaos.is_deleted() {
        target = Phase::Finished;
    }
    target
}

/// Delay until the nearest future window edge. Zero when both edges are
/// already behind `now`.
pub fn requeue_after(chaos: &ChaosObject, now: DateTime<Utc>) -> Duration {
    [chaos.status.next_recover, chaos.status.next_start]
        .into_iter()
        .flatten()
        .filter_map(|t| (t - now).to_std().ok())
        .filter(|d| !d.is_zero())
        .min()
        .unwrap_or(Duration::ZERO)
}

async fn fetch(machine: &StateMachine, kind: ChaosKind, key: &ObjectKey) -> Result<Option<ChaosObject>> {
    match machine.store().get_chaos(kind, key).await {
        Ok(chaos) => Ok(Some(chaos)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct CommonReconciler {
    machine: StateMachine,
}

impl CommonReconciler {
    pub fn new(machine: StateMachine) -> Self {
        CommonReconciler { machine }
    }

    pub async fn reconcile(&self, kind: ChaosKind, key: &ObjectKey, now: DateTime<Utc>) -> Result<Reconciled> {
        let Some(chaos) = fetch(&self.machine, kind, key).await? else {
            return Ok(Reconciled::gone());
        };
        self.step(chaos, now).await
    }

    async fn step(&self, mut chaos: ChaosObject, now: DateTime<Utc>) -> Result<Reconciled> {
        if !chaos.is_deleted() {
            chaos.validate()?;
        }
        let target = common_target(&chaos);
        log::info!("[Reconciler] {} {}: one-shot, target {}", chaos.kind, chaos.key(), target);
        StateMachine::into(&self.machine, &mut chaos, target, now).await?;
        Ok(Reconciled::settled(chaos.status.phase))
    }
}

#[derive(Clone)]
pub struct TwoPhaseReconciler {
    machine: StateMachine,
}

impl TwoPhaseReconciler {
    pub fn new(machine: StateMachine) -> Self {
        TwoPhaseReconciler { machine }
    }

    pub async fn reconcile(&self, kind: ChaosKind, key: &ObjectKey, now: DateTime<Utc>) -> Result<Reconciled> {
        let Some(chaos) = fetch(&self.machine, kind, key).await? else {
            return Ok(Reconciled::gone());
        };
        self.step(chaos, now).await
    }

    async fn step(&self, mut chaos: ChaosObject, now: DateTime<Utc>) -> Result<Reconciled> {
        if !chaos.is_deleted() {
            chaos.validate()?;
        }
        let target = two_phase_target(&chaos, now);
        log::info!("[Reconciler] {} {}: scheduled, target {}", chaos.kind, chaos.key(), target);
        StateMachine::into(&self.machine, &mut chaos, target, now).await?;

        let phase = chaos.status.phase;
        if matches!(phase, Phase::Finished | Phase::Paused) || chaos.status.halted {
            return Ok(Reconciled::settled(phase));
        }

        let delay = requeue_after(&chaos, now);
        if delay.is_zero() {
            log::warn!(
                "[Reconciler] {}: now {} is past nextStart {:?} and nextRecover {:?}, requeueing",
                chaos.key(),
                now,
                chaos.status.next_start,
                chaos.status.next_recover
            );
        } else {
            log::debug!("[Reconciler] {}: requeue after {:?}", chaos.key(), delay);
        }
        Ok(Reconciled {
            phase: Some(phase),
            requeue_after: Some(delay),
        })
    }
}

/// Routes each object to the reconciler matching its shape.
#[derive(Clone)]
pub struct ChaosReconciler {
    common: CommonReconciler,
    two_phase: TwoPhaseReconciler,
}

impl ChaosReconciler {
    pub fn new(machine: StateMachine) -> Self {
        ChaosReconciler {
            common: CommonReconciler::new(machine.clone()),
            two_phase: TwoPhaseReconciler::new(machine),
        }
    }

    pub async fn reconcile(&self, kind: ChaosKind, key: &ObjectKey, now: DateTime<Utc>) -> Result<Reconciled> {
        let Some(chaos) = fetch(&self.common.machine, kind, key).await? else {
            log::debug!("[Reconciler] {} {} is gone", kind, key);
            return Ok(Reconciled::gone());
        };
        if chaos.spec.scheduler.is_some() {
            self.two_phase.step(chaos, now).await
        } else {
            self.common.step(chaos, now).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, PodKillParams};
    use crate::models::{ChaosSpec, SchedulerSpec, ANNOTATION_PAUSE};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 12, 7, h, m, 0).unwrap()
    }

    fn scheduled() -> ChaosObject {
        let mut spec = ChaosSpec::new(Action::PodKill(PodKillParams::default()));
        spec.duration = Some("15m".into());
        spec.scheduler = Some(SchedulerSpec {
            cron: "@every 20m".into(),
        });
        ChaosObject::new(ChaosKind::PodChaos, "default", "p", spec)
    }

    #[test]
    fn test_first_sight_runs() {
        let chaos = scheduled();
        assert_eq!(two_phase_target(&chaos, at(13, 10)), Phase::Running);
    }

    #[test]
    fn test_window_edges() {
        let mut chaos = scheduled();
        chaos.status.phase = Phase::Running;
        chaos.status.next_recover = Some(at(13, 25));
        chaos.status.next_start = Some(at(13, 30));

        assert_eq!(two_phase_target(&chaos, at(13, 20)), Phase::Running);
        assert_eq!(two_phase_target(&chaos, at(13, 26)), Phase::Waiting);
        // A start that is due wins over a recover that is due.
        assert_eq!(two_phase_target(&chaos, at(13, 31)), Phase::Running);
    }

    #[test]
    fn test_pause_and_delete_override() {
        let mut chaos = scheduled();
        chaos.status.phase = Phase::Running;
        chaos.status.next_start = Some(at(13, 30));
        chaos
            .metadata
            .annotations
            .insert(ANNOTATION_PAUSE.into(), "true".into());
        assert_eq!(two_phase_target(&chaos, at(13, 11)), Phase::Paused);

        chaos.metadata.deletion_timestamp = Some(at(13, 12));
        assert_eq!(two_phase_target(&chaos, at(13, 12)), Phase::Finished);
    }

    #[test]
    fn test_unpause_resumes() {
        let mut chaos = scheduled();
        chaos.status.phase = Phase::Paused;
        chaos.status.next_start = Some(at(14, 30));
        assert_eq!(two_phase_target(&chaos, at(13, 55)), Phase::Running);
    }

    #[test]
    fn test_halted_stays_failed_until_deleted() {
        let mut chaos = scheduled();
        chaos.status.phase = Phase::Failed;
        chaos.status.halted = true;
        assert_eq!(two_phase_target(&chaos, at(13, 10)), Phase::Failed);

        chaos.status.halted = false;
        assert_eq!(two_phase_target(&chaos, at(13, 10)), Phase::Running);

        chaos.status.halted = true;
        chaos.metadata.deletion_timestamp = Some(at(13, 11));
        assert_eq!(two_phase_target(&chaos, at(13, 11)), Phase::Finished);
    }

    #[test]
    fn test_requeue_after_picks_nearest_future_edge() {
        let mut chaos = scheduled();
        chaos.status.next_recover = Some(at(13, 25));
        chaos.status.next_start = Some(at(13, 30));
        assert_eq!(requeue_after(&chaos, at(13, 10)), Duration::from_secs(15 * 60));
        assert_eq!(requeue_after(&chaos, at(13, 26)), Duration::from_secs(4 * 60));
        assert_eq!(requeue_after(&chaos, at(13, 31)), Duration::ZERO);
    }

    #[test]
    fn test_common_target() {
        let mut chaos = scheduled();
        chaos.spec.scheduler = None;
        assert_eq!(common_target(&chaos), Phase::Running);
        chaos.status.phase = Phase::Running;
        assert_eq!(common_target(&chaos), Phase::Running);
        chaos.status.phase = Phase::Failed;
        assert_eq!(common_target(&chaos), Phase::Running);
        chaos.metadata.deletion_timestamp = Some(at(1, 0));
        assert_eq!(common_target(&chaos), Phase::Finished);
    }
}
