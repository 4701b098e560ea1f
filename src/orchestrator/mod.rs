//! Chaos orchestration: lifecycle state machine, reconcilers, fan-out
//! executor and the controller runtime that drives them.
//!
//! `ChaosController::run` is the long-lived loop. It lists every watched
//! chaos object each resync period, keeps at most one reconcile in flight
//! per object, and re-enqueues objects after the delay their reconcile asked
//! for or after an error backoff.

pub mod checkpoint;
pub mod executor;
pub mod finalizers;
pub mod machine;
pub mod reconciler;
pub mod scheduler;
pub mod state;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError, JoinSet};

pub use executor::Executor;
pub use finalizers::{FinalizerKey, Finalizers};
pub use machine::StateMachine;
pub use reconciler::{ChaosReconciler, CommonReconciler, Reconciled, TwoPhaseReconciler};
pub use scheduler::{iterate_next, CronSchedule};
pub use state::{transition, Handler, Phase};

use crate::chaos::ChaosContext;
use crate::config::ControllerConfig;
use crate::daemon::DaemonConnector;
use crate::dns::DnsClient;
use crate::error::{ChaosError, ConfigError, Result};
use crate::events::EventRecorder;
use crate::faultserver::FaultServerConnector;
use crate::models::{ChaosKind, ObjectKey};
use crate::selector::Selector;
use crate::store::ClusterStore;

/// First error backoff; doubles per consecutive failure.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const BACKOFF_MAX: Duration = Duration::from_secs(300);

type ObjectRef = (ChaosKind, ObjectKey);
type Outcome = (ObjectRef, Result<Reconciled>);

/// Delay before retrying an object that failed `failures` times in a row.
pub fn error_backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    BACKOFF_BASE
        .checked_mul(1u32 << exp)
        .map_or(BACKOFF_MAX, |d| d.min(BACKOFF_MAX))
}

/// Pair a finished reconcile task with its object. A task that panicked
/// is turned into an error for the object it was working on, so the object
/// leaves the in-flight set and backs off like any other failure.
fn reclaim(
    spawned: &mut HashMap<task::Id, ObjectRef>,
    joined: std::result::Result<(task::Id, Outcome), JoinError>,
) -> Option<Outcome> {
    match joined {
        Ok((id, outcome)) => {
            spawned.remove(&id);
            Some(outcome)
        }
        Err(e) => {
            let Some(obj) = spawned.remove(&e.id()) else {
                log::error!("[Controller] Untracked reconcile task failed: {}", e);
                return None;
            };
            log::error!("[Controller] Reconcile of {} {} panicked: {}", obj.0, obj.1, e);
            Some((obj, Err(ChaosError::Task(e.to_string()))))
        }
    }
}

/// Per-object bookkeeping of the run loop.
#[derive(Default)]
struct WorkQueue {
    in_flight: HashSet<ObjectRef>,
    /// Enqueued again while in flight; re-run once the current pass ends.
    dirty: HashSet<ObjectRef>,
    failures: HashMap<ObjectRef, u32>,
}

impl WorkQueue {
    /// Mark `obj` in flight; `false` when it already is.
    fn start(&mut self, obj: &ObjectRef) -> bool {
        if self.in_flight.contains(obj) {
            self.dirty.insert(obj.clone());
            return false;
        }
        self.in_flight.insert(obj.clone());
        true
    }

    /// Returns whether the object was enqueued again meanwhile.
    fn finish(&mut self, obj: &ObjectRef) -> bool {
        self.in_flight.remove(obj);
        self.dirty.remove(obj)
    }

    fn failed(&mut self, obj: &ObjectRef) -> u32 {
        let n = self.failures.entry(obj.clone()).or_insert(0);
        *n += 1;
        *n
    }

    fn succeeded(&mut self, obj: &ObjectRef) {
        self.failures.remove(obj);
    }
}

#[derive(Clone)]
pub struct ChaosController {
    reconciler: ChaosReconciler,
    store: Arc<dyn ClusterStore>,
    kinds: Vec<ChaosKind>,
    namespace: Option<String>,
    resync: Duration,
}

impl ChaosController {
    pub fn new(reconciler: ChaosReconciler, store: Arc<dyn ClusterStore>, config: &ControllerConfig) -> Self {
        ChaosController {
            reconciler,
            store,
            kinds: config.watched_kinds.clone(),
            namespace: (!config.cluster_scoped).then(|| config.target_namespace.clone()),
            resync: config.resync_period(),
        }
    }

    /// Wire the whole reconcile stack from its collaborators.
    pub fn from_config(
        config: &ControllerConfig,
        store: Arc<dyn ClusterStore>,
        daemons: Arc<dyn DaemonConnector>,
        fault_servers: Arc<dyn FaultServerConnector>,
        dns: Arc<dyn DnsClient>,
        events: Arc<dyn EventRecorder>,
    ) -> std::result::Result<Self, ConfigError> {
        let selector = Selector::new(Arc::clone(&store), config.namespace_policy()?)
            .with_scope(config.cluster_scoped, config.target_namespace.clone());
        let ctx = ChaosContext {
            store: Arc::clone(&store),
            selector: Arc::new(selector),
            daemons,
            fault_servers,
            dns,
            settings: config.dispatch_settings(),
        };
        let machine = StateMachine::new(Executor::new(Arc::new(ctx)), events);
        Ok(ChaosController::new(ChaosReconciler::new(machine), store, config))
    }

    pub fn reconciler(&self) -> &ChaosReconciler {
        &self.reconciler
    }

    /// Reconcile one object now.
    pub async fn reconcile_once(&self, kind: ChaosKind, key: &ObjectKey) -> Result<Reconciled> {
        self.reconciler.reconcile(kind, key, Utc::now()).await
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// In-flight reconciles are awaited before returning; pending requeue
    /// timers are dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        log::info!(
            "[Controller] Starting: kinds {:?}, scope {}, resync every {:?}",
            self.kinds,
            self.namespace.as_deref().unwrap_or("cluster"),
            self.resync
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<ObjectRef>();
        let mut queue = WorkQueue::default();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut spawned: HashMap<task::Id, ObjectRef> = HashMap::new();
        let mut timers: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.resync);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    for obj in self.list_watched().await {
                        self.dispatch(obj, &mut queue, &mut tasks, &mut spawned);
                    }
                }
                Some(obj) = rx.recv() => {
                    self.dispatch(obj, &mut queue, &mut tasks, &mut spawned);
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    if let Some((obj, result)) = reclaim(&mut spawned, joined) {
                        self.settle(obj, result, &mut queue, &mut timers, &tx);
                    }
                }
                Some(_) = timers.join_next(), if !timers.is_empty() => {}
            }
        }

        log::info!("[Controller] Shutting down, waiting for {} reconciles", tasks.len());
        timers.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(((kind, key), Err(e))) = joined {
                log::warn!("[Controller] {} {} ended with error during shutdown: {}", kind, key, e);
            }
        }
        log::info!("[Controller] Stopped");
        Ok(())
    }

    async fn list_watched(&self) -> Vec<ObjectRef> {
        let mut objects = Vec::new();
        for &kind in &self.kinds {
            match self.store.list_chaos(kind, self.namespace.as_deref()).await {
                Ok(list) => objects.extend(list.into_iter().map(|c| (kind, c.key()))),
                Err(e) => log::warn!("[Controller] Listing {} failed: {}", kind, e),
            }
        }
        log::debug!("[Controller] Resync found {} objects", objects.len());
        objects
    }

    fn dispatch(
        &self,
        obj: ObjectRef,
        queue: &mut WorkQueue,
        tasks: &mut JoinSet<Outcome>,
        spawned: &mut HashMap<task::Id, ObjectRef>,
    ) {
        if !queue.start(&obj) {
            log::debug!("[Controller] {} {} already in flight", obj.0, obj.1);
            return;
        }
        let reconciler = self.reconciler.clone();
        let tracked = obj.clone();
        let handle = tasks.spawn(async move {
            let (kind, key) = &obj;
            let result = reconciler.reconcile(*kind, key, Utc::now()).await;
            (obj, result)
        });
        spawned.insert(handle.id(), tracked);
    }

    fn settle(
        &self,
        obj: ObjectRef,
        result: Result<Reconciled>,
        queue: &mut WorkQueue,
        timers: &mut JoinSet<()>,
        tx: &mpsc::UnboundedSender<ObjectRef>,
    ) {
        let rerun = queue.finish(&obj);
        let delay = match result {
            Ok(reconciled) => {
                queue.succeeded(&obj);
                reconciled.requeue_after
            }
            Err(e) if e.is_fatal() => {
                queue.succeeded(&obj);
                log::error!("[Controller] {} {} failed permanently: {}", obj.0, obj.1, e);
                None
            }
            Err(e) => {
                let delay = error_backoff(queue.failed(&obj));
                log::warn!("[Controller] {} {} failed, retrying in {:?}: {}", obj.0, obj.1, delay, e);
                Some(delay)
            }
        };

        if rerun {
            let _ = tx.send(obj);
        } else if let Some(delay) = delay {
            let tx = tx.clone();
            timers.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(obj);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_backoff_doubles_and_caps() {
        assert_eq!(error_backoff(1), Duration::from_secs(1));
        assert_eq!(error_backoff(2), Duration::from_secs(2));
        assert_eq!(error_backoff(5), Duration::from_secs(16));
        assert_eq!(error_backoff(9), Duration::from_secs(256));
        assert_eq!(error_backoff(10), BACKOFF_MAX);
        assert_eq!(error_backoff(u32::MAX), BACKOFF_MAX);
    }

    #[tokio::test]
    async fn test_panicked_reconcile_releases_its_object() {
        let obj = (ChaosKind::PodChaos, ObjectKey::new("default", "p"));
        let mut queue = WorkQueue::default();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut spawned = HashMap::new();

        assert!(queue.start(&obj));
        let moved = obj.clone();
        let handle = tasks.spawn(async move {
            if moved.1.name == "p" {
                panic!("reconcile blew up");
            }
            (moved, Ok(Reconciled { phase: None, requeue_after: None }))
        });
        spawned.insert(handle.id(), obj.clone());

        let joined = tasks.join_next_with_id().await.unwrap();
        let (back, result) = reclaim(&mut spawned, joined).unwrap();
        assert_eq!(back, obj);
        assert!(matches!(result, Err(ChaosError::Task(_))));
        assert!(!result.unwrap_err().is_fatal());
        assert!(spawned.is_empty());

        // The object is free to run again.
        assert!(!queue.finish(&back));
        assert!(queue.start(&obj));
    }

    #[test]
    fn test_work_queue_single_flight() {
        let mut queue = WorkQueue::default();
        let obj = (ChaosKind::PodChaos, ObjectKey::new("default", "p"));

        assert!(queue.start(&obj));
        assert!(!queue.start(&obj));
        assert!(queue.finish(&obj));
        assert!(queue.start(&obj));
        assert!(!queue.finish(&obj));

        assert_eq!(queue.failed(&obj), 1);
        assert_eq!(queue.failed(&obj), 2);
        queue.succeeded(&obj);
        assert_eq!(queue.failed(&obj), 1);
    }
}
