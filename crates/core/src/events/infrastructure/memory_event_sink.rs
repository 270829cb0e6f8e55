use std::sync::{Arc, Mutex};

use crate::events::domain::event_sink::{EventSink, SinkError};
use crate::events::domain::presence_event::PresenceEvent;

/// In-memory sink. Clones share the same event list, so a caller can keep a
/// handle after boxing the sink into a tracker.
///
/// `fail_next` and `fail_after` make appends return `SinkError::Unavailable`
/// without recording anything.
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<PresenceEvent>>>,
    failures: Arc<Mutex<FailurePlan>>,
}

#[derive(Default)]
struct FailurePlan {
    passes: usize,
    failures: usize,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.label().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_after(0, count);
    }

    /// Lets `passes` appends through, then fails the next `count`.
    pub fn fail_after(&self, passes: usize, count: usize) {
        if let Ok(mut plan) = self.failures.lock() {
            *plan = FailurePlan {
                passes,
                failures: count,
            };
        }
    }
}

impl EventSink for MemoryEventSink {
    fn append(&mut self, event: &PresenceEvent) -> Result<(), SinkError> {
        let mut plan = self
            .failures
            .lock()
            .map_err(|_| SinkError::Unavailable("failure plan poisoned".into()))?;
        if plan.passes > 0 {
            plan.passes -= 1;
        } else if plan.failures > 0 {
            plan.failures -= 1;
            return Err(SinkError::Unavailable("injected failure".into()));
        }
        drop(plan);

        self.events
            .lock()
            .map_err(|_| SinkError::Unavailable("event list poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn event(label: &str) -> PresenceEvent {
        PresenceEvent::new(label.to_string(), Local::now(), 0.5, 1, 2, 2)
    }

    #[test]
    fn test_clone_shares_events() {
        let handle = MemoryEventSink::new();
        let mut sink = handle.clone();

        sink.append(&event("cup")).unwrap();

        assert_eq!(handle.labels(), vec!["cup"]);
    }

    #[test]
    fn test_fail_next_rejects_then_recovers() {
        let handle = MemoryEventSink::new();
        let mut sink = handle.clone();
        handle.fail_next(2);

        assert!(sink.append(&event("a")).is_err());
        assert!(sink.append(&event("b")).is_err());
        assert!(sink.append(&event("c")).is_ok());

        assert_eq!(handle.labels(), vec!["c"]);
    }

    #[test]
    fn test_fail_after_lets_earlier_appends_through() {
        let handle = MemoryEventSink::new();
        let mut sink = handle.clone();
        handle.fail_after(1, 1);

        assert!(sink.append(&event("a")).is_ok());
        assert!(sink.append(&event("b")).is_err());
        assert!(sink.append(&event("c")).is_ok());

        assert_eq!(handle.labels(), vec!["a", "c"]);
    }

    #[test]
    fn test_new_sink_is_empty() {
        let sink = MemoryEventSink::new();
        assert!(sink.is_empty());
        assert_eq!(sink.len(), 0);
    }
}
