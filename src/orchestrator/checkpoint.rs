//! Persisting a chaos object through the compare-and-swap store.
//!
//! A write that loses the race re-fetches the latest copy, carries the
//! controller-owned fields (status and finalizers) over onto it and tries
//! again with exponential backoff. Every other field of the fresh copy wins,
//! so a concurrent user edit (a pause annotation, a deletion marker) is kept.

use std::time::Duration;

use crate::error::Result;
use crate::models::ChaosObject;
use crate::store::ClusterStore;

/// Backoff between conflicting writes.
#[derive(Debug, Clone, Copy)]
pub struct RetryBackoff {
    pub initial: Duration,
    pub factor: u32,
    pub steps: usize,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        RetryBackoff {
            initial: Duration::from_millis(10),
            factor: 5,
            steps: 4,
        }
    }
}

/// Write `chaos`, retrying on conflict. On success `chaos` is replaced by
/// the stored copy, so its resource version is current.
pub async fn persist(store: &dyn ClusterStore, chaos: &mut ChaosObject) -> Result<()> {
    persist_with(store, chaos, RetryBackoff::default()).await
}

pub async fn persist_with(
    store: &dyn ClusterStore,
    chaos: &mut ChaosObject,
    backoff: RetryBackoff,
) -> Result<()> {
    let err = match store.update_chaos(chaos).await {
        Ok(stored) => {
            *chaos = stored;
            return Ok(());
        }
        Err(e) if e.is_conflict() => e,
        Err(e) => return Err(e),
    };
    log::warn!("[Checkpoint] {} ({}), retrying on conflict", chaos.key(), err);

    let mut delay = backoff.initial;
    let mut last = err;
    for step in 0..backoff.steps {
        let mut fresh = store.get_chaos(chaos.kind, &chaos.key()).await?;
        fresh.status = chaos.status.clone();
        fresh.metadata.finalizers = chaos.metadata.finalizers.clone();

        match store.update_chaos(&fresh).await {
            Ok(stored) => {
                *chaos = stored;
                return Ok(());
            }
            Err(e) if e.is_conflict() => {
                log::debug!("[Checkpoint] Conflict on retry {} for {}", step + 1, chaos.key());
                last = e;
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(delay).await;
        delay *= backoff.factor;
    }

    log::error!("[Checkpoint] Giving up on {} after {} retries", chaos.key(), backoff.steps);
    Err(last)
}
