//! Domain event system: decoupled observation of a running engine.
//!
//! Events are published when something interesting happens during a run.
//! Observers (progress displays, audit logs, tests) subscribe without the
//! scheduler knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::state::TaskStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A full cycle finished
    CycleCompleted {
        run_id: String,
        cycle: u32,
        task_status: TaskStatus,
        timestamp: DateTime<Utc>,
    },

    /// The completion service answered
    ResponseGenerated {
        run_id: String,
        model: String,
        max_tokens: u32,
        response_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// An action was invoked
    ActionExecuted {
        run_id: String,
        action: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A response processor rejected the completion
    ProcessorFailed {
        run_id: String,
        processor: String,
        timestamp: DateTime<Utc>,
    },

    /// Memory eviction dropped messages from history
    HistoryEvicted {
        run_id: String,
        evicted: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of domain events to any number of observers.
///
/// Backed by `tokio::sync::broadcast`; a subscriber that falls more than
/// `capacity` events behind sees `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Events published while nobody listens are dropped.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ActionExecuted {
            run_id: "run-1".into(),
            action: "echo".into(),
            success: true,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionExecuted { action, success, .. } => {
                assert_eq!(action, "echo");
                assert!(success);
            }
            _ => panic!("Expected ActionExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::CycleCompleted {
            run_id: "run-1".into(),
            cycle: 1,
            task_status: TaskStatus::Incomplete,
            timestamp: Utc::now(),
        });
    }
}
