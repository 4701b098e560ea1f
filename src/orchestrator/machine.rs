//! The lifecycle state machine.
//!
//! `StateMachine::into` looks up the handler for `(current, target)`, runs
//! it, and persists the object when the handler changed anything. Handlers
//! mutate the in-memory object only; a failed handler still persists, so the
//! failure message and any finalizers inserted before the failure survive.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::{ChaosError, Result, SchedulerError};
use crate::events::{EventKind, EventRecorder};
use crate::models::ChaosObject;
use crate::orchestrator::checkpoint;
use crate::orchestrator::executor::Executor;
use crate::orchestrator::scheduler::{format_duration, iterate_next, ITER_MAX};
use crate::orchestrator::state::{transition, Handler, Phase};
use crate::store::ClusterStore;

#[derive(Clone)]
pub struct StateMachine {
    executor: Executor,
    store: Arc<dyn ClusterStore>,
    events: Arc<dyn EventRecorder>,
}

impl StateMachine {
    pub fn new(executor: Executor, events: Arc<dyn EventRecorder>) -> Self {
        let store = Arc::clone(&executor.context().store);
        StateMachine {
            executor,
            store,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    /// Drive `chaos` towards `target` and persist the outcome.
    pub async fn into(&self, chaos: &mut ChaosObject, target: Phase, now: DateTime<Utc>) -> Result<()> {
        let current = chaos.status.phase;
        log::debug!(
            "[StateMachine] {}: {} -> {} ({:?})",
            chaos.key(),
            current,
            target,
            transition(current, target)
        );

        let (updated, result) = self.run(chaos, target, now).await;
        if let Err(e) = &result {
            log::error!("[StateMachine] {} failed stepping into {}: {}", chaos.key(), target, e);
        }

        if updated {
            checkpoint::persist(&*self.store, chaos).await?;
        }
        result
    }

    async fn run(&self, chaos: &mut ChaosObject, target: Phase, now: DateTime<Utc>) -> (bool, Result<()>) {
        let handler = transition(chaos.status.phase, target);

        // A deleted object recovers whatever is still recorded, from any phase.
        if chaos.is_deleted()
            && target == Phase::Finished
            && handler != Handler::Recover
            && !chaos.metadata.finalizers.is_empty()
        {
            return self.recover(chaos, target, now).await;
        }

        match handler {
            Handler::Noop => (noop(chaos, target), Ok(())),
            Handler::Apply => self.apply(chaos, target, now).await,
            Handler::Recover => self.recover(chaos, target, now).await,
            Handler::Resume => self.resume(chaos, now).await,
            Handler::Unexpected => (
                false,
                Err(ChaosError::UnexpectedTransition {
                    from: chaos.status.phase,
                    to: target,
                }),
            ),
        }
    }

    async fn apply(&self, chaos: &mut ChaosObject, target: Phase, start: DateTime<Utc>) -> (bool, Result<()>) {
        let duration = match chaos.duration() {
            Ok(d) => d.unwrap_or_else(Duration::zero),
            Err(e) => return (false, Err(e.into())),
        };

        // The next window is settled before anything is injected.
        let window = if chaos.is_scheduled() {
            let schedule = match chaos.schedule() {
                Ok(s) => s,
                Err(e) => return (false, Err(e)),
            };
            match iterate_next(schedule.as_ref(), start, duration) {
                Ok(window) => Some(window),
                Err(e) => return fail(chaos, e.into()),
            }
        } else {
            None
        };

        log::info!("[StateMachine] Applying {} ({} -> {})", chaos.key(), chaos.status.phase, target);
        if let Err(e) = self.executor.apply(chaos).await {
            chaos.status.failed_message = Some(e.to_string());
            // Selection problems are reported without giving up the phase.
            if !matches!(e, ChaosError::Selection(_)) {
                chaos.status.phase = Phase::Failed;
            }
            self.events.record(chaos, EventKind::ChaosFailed, &e.to_string());
            return (true, Err(e));
        }

        chaos.status.failed_message = None;
        chaos.status.phase = target;
        chaos.status.start_time = Some(start);
        chaos.status.end_time = None;
        chaos.set_status_duration(duration);
        if let Some((next_start, next_recover)) = window {
            chaos.status.next_start = Some(next_start);
            chaos.status.next_recover = Some(next_recover);
        }

        let message = format!("{} targets", chaos.status.pod_records.len());
        self.events.record(chaos, EventKind::ChaosInjected, &message);
        (true, Ok(()))
    }

    async fn recover(&self, chaos: &mut ChaosObject, target: Phase, now: DateTime<Utc>) -> (bool, Result<()>) {
        log::info!("[StateMachine] Recovering {} ({} -> {})", chaos.key(), chaos.status.phase, target);
        if let Err(e) = self.executor.recover(chaos).await {
            chaos.status.failed_message = Some(e.to_string());
            self.events.record(chaos, EventKind::ChaosFailed, &e.to_string());
            return (true, Err(e));
        }

        chaos.status.phase = target;
        chaos.status.end_time = Some(now);
        if let Some(start) = chaos.status.start_time {
            chaos.status.duration = Some(format_duration(now - start));
        }
        if target == Phase::Paused {
            chaos.status.next_start = Some(now);
        }
        self.events.record(chaos, EventKind::ChaosRecovered, target.as_str());
        (true, Ok(()))
    }

    /// Walk the schedule forward from the last start until `now` falls
    /// inside a window (re-inject with that window's start) or before the
    /// next one (wait).
    async fn resume(&self, chaos: &mut ChaosObject, now: DateTime<Utc>) -> (bool, Result<()>) {
        if !chaos.is_scheduled() {
            return self.apply(chaos, Phase::Running, now).await;
        }

        let (schedule, duration) = match (chaos.schedule(), chaos.duration()) {
            (Ok(Some(s)), Ok(Some(d))) => (s, d),
            (Err(e), _) => return (false, Err(e)),
            (_, Err(e)) => return (false, Err(e.into())),
            _ => return (false, Err(SchedulerError::Misdefined.into())),
        };

        let mut last_start = chaos.status.start_time.unwrap_or(now);
        let (mut next_start, mut next_recover) = if chaos.status.start_time.is_some() {
            match iterate_next(Some(&schedule), last_start, duration) {
                Ok(window) => window,
                Err(e) => return fail(chaos, e.into()),
            }
        } else {
            (now, now)
        };

        let mut counter = 0;
        loop {
            if next_recover > now {
                chaos.status.next_start = Some(next_start);
                chaos.status.next_recover = Some(next_recover);
                log::info!("[StateMachine] Resuming {} mid-window from {}", chaos.key(), last_start);
                return self.apply(chaos, Phase::Running, last_start).await;
            }
            if next_start > now {
                chaos.status.next_start = Some(next_start);
                chaos.status.next_recover = Some(next_recover);
                log::info!("[StateMachine] Resuming {}, next window at {}", chaos.key(), next_start);
                noop(chaos, Phase::Waiting);
                return (true, Ok(()));
            }

            last_start = next_start;
            match iterate_next(Some(&schedule), next_start, duration) {
                Ok((s, r)) => {
                    next_start = s;
                    next_recover = r;
                }
                Err(e) => return fail(chaos, e.into()),
            }

            counter += 1;
            if counter > ITER_MAX {
                let err = SchedulerError::IterationsExceeded {
                    limit: ITER_MAX,
                    context: format!(
                        "resuming from pause with nextRecover({}) nextStart({})",
                        next_recover, next_start
                    ),
                };
                return fail(chaos, err.into());
            }
        }
    }
}

/// Scheduler overruns park the experiment in Failed for good.
fn fail(chaos: &mut ChaosObject, err: ChaosError) -> (bool, Result<()>) {
    if err.is_fatal() {
        chaos.status.phase = Phase::Failed;
        chaos.status.halted = true;
    }
    chaos.status.failed_message = Some(err.to_string());
    (true, Err(err))
}

fn noop(chaos: &mut ChaosObject, target: Phase) -> bool {
    if chaos.status.phase == target {
        return false;
    }
    chaos.status.phase = target;
    true
}
