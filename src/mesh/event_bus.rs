use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertReason {
    Veto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshEvent {
    Alert {
        node_id: String,
        score: f64,
        reason: AlertReason,
        timestamp: DateTime<Utc>,
    },
    Relayed {
        node_id: String,
        score: f64,
        delivered: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
    ForwardFailed {
        node_id: String,
        neighbor: String,
        error: String,
    },
    MalformedRejected {
        peer: String,
        bytes: usize,
    },
}

impl MeshEvent {
    pub fn is_alert(&self) -> bool {
        matches!(self, MeshEvent::Alert { .. })
    }
}

pub struct EventBus {
    sender: broadcast::Sender<MeshEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: MeshEvent) {
        // Err only means nobody is subscribed.
        if let Ok(receivers) = self.sender.send(event) {
            tracing::trace!("📡 Event published to {} receivers", receivers);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(MeshEvent::Alert {
            node_id: "n1".into(),
            score: 0.1,
            reason: AlertReason::Veto,
            timestamp: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert!(event.is_alert());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        bus.publish(MeshEvent::MalformedRejected {
            peer: "127.0.0.1:1".into(),
            bytes: 3,
        });
    }
}
