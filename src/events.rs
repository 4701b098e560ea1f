//! Experiment events.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use crate::models::{ChaosKind, ChaosObject, ObjectKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChaosInjected,
    ChaosRecovered,
    ChaosFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ChaosInjected => "ChaosInjected",
            EventKind::ChaosRecovered => "ChaosRecovered",
            EventKind::ChaosFailed => "ChaosFailed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: ChaosKind,
    pub object: ObjectKey,
    pub reason: EventKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, chaos: &ChaosObject, reason: EventKind, message: &str);
}

/// Emits each event as a log line and keeps the most recent ones.
pub struct LogEventRecorder {
    capacity: usize,
    recent: Mutex<VecDeque<Event>>,
}

impl Default for LogEventRecorder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LogEventRecorder {
    pub fn new(capacity: usize) -> Self {
        LogEventRecorder {
            capacity,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.recent
            .lock()
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn events_for(&self, object: &ObjectKey) -> Vec<EventKind> {
        self.events()
            .into_iter()
            .filter(|e| &e.object == object)
            .map(|e| e.reason)
            .collect()
    }
}

impl EventRecorder for LogEventRecorder {
    fn record(&self, chaos: &ChaosObject, reason: EventKind, message: &str) {
        match reason {
            EventKind::ChaosFailed => {
                log::warn!("[Event] {} {} {}: {}", chaos.kind, chaos.key(), reason, message)
            }
            _ => log::info!("[Event] {} {} {}: {}", chaos.kind, chaos.key(), reason, message),
        }

        if self.capacity == 0 {
            return;
        }
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(Event {
                kind: chaos.kind,
                object: chaos.key(),
                reason,
                message: message.to_string(),
                at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::models::ChaosSpec;

    #[test]
    fn test_recorder_keeps_most_recent() {
        let recorder = LogEventRecorder::new(2);
        let chaos = ChaosObject::new(
            ChaosKind::PodChaos,
            "default",
            "p",
            ChaosSpec::new(Action::PodFailure),
        );
        recorder.record(&chaos, EventKind::ChaosInjected, "1 target");
        recorder.record(&chaos, EventKind::ChaosRecovered, "");
        recorder.record(&chaos, EventKind::ChaosFailed, "boom");

        assert_eq!(
            recorder.events_for(&chaos.key()),
            vec![EventKind::ChaosRecovered, EventKind::ChaosFailed]
        );
    }
}
