//! Status stream for the presentation layer
//!
//! Every session state change is published as a full snapshot; slow or
//! absent subscribers never block the control loop.

use crate::domain::call::session::CallSessionSnapshot;
use crate::domain::shared::error::CallError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted on the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session changed; the full snapshot replaces any prior view.
    Updated { snapshot: CallSessionSnapshot },
    /// An asynchronous operation failed; shown as a transient message.
    OperationFailed { context: String, error: String },
}

/// Fan-out of session events over a broadcast channel.
#[derive(Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<SessionEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn updated(&self, snapshot: CallSessionSnapshot) {
        self.publish(SessionEvent::Updated { snapshot });
    }

    pub fn operation_failed(&self, context: &str, error: &CallError) {
        self.publish(SessionEvent::OperationFailed {
            context: context.to_string(),
            error: error.to_string(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        // Err means no subscriber is listening right now; that is fine.
        if self.tx.send(event).is_err() {
            debug!("session event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::session::CallSession;

    #[tokio::test]
    async fn test_subscribers_receive_updates() {
        let broadcaster = StatusBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        let snapshot = CallSession::new().snapshot();
        broadcaster.updated(snapshot.clone());

        match rx.recv().await.unwrap() {
            SessionEvent::Updated { snapshot: got } => assert_eq!(got, snapshot),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let broadcaster = StatusBroadcaster::new(16);
        broadcaster.updated(CallSession::new().snapshot());
        broadcaster.operation_failed("transfer", &CallError::TransferNoAnswer);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_and_recovers() {
        let broadcaster = StatusBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();

        // Overflow the channel; publishing never blocks on the slow
        // receiver.
        let mut session = CallSession::new();
        for i in 1..=4 {
            session.duration_seconds = i;
            broadcaster.updated(session.snapshot());
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert_eq!(missed, 2),
            other => panic!("expected lag, got {:?}", other),
        }

        // The receiver resumes at the oldest retained event and catches up
        // to the latest snapshot.
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        match last {
            Some(SessionEvent::Updated { snapshot }) => {
                assert_eq!(snapshot.duration_seconds, 4)
            }
            other => panic!("expected latest snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operation_failed_serializes_for_the_ui() {
        let broadcaster = StatusBroadcaster::new(4);
        let mut rx = broadcaster.subscribe();
        broadcaster.operation_failed("add_participant", &CallError::ParticipantNoAnswer);

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("operation_failed"));
        assert!(json.contains("participant did not answer"));
    }
}
