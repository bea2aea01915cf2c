//! Guard outcome notifications.
//!
//! Callers that need to react to gates (alerting, kill switches) subscribe via
//! [`OracleGuard::subscribe`](super::OracleGuard::subscribe). Sending never
//! blocks and a guard with no subscribers simply drops events.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::chain::ChainId;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GuardEvent {
    /// A request was refused because the L2 sequencer is down.
    SequencerDown { chain_id: ChainId, since: Option<u64> },
    /// Oracle and TWAP disagreed beyond the reject threshold.
    DeviationRejected {
        chain_id: ChainId,
        pair: String,
        oracle_price: Decimal,
        twap_price: Decimal,
        deviation: Decimal,
    },
    /// A quote was accepted without oracle validation.
    QuoteBypassed {
        chain_id: ChainId,
        pair: String,
        quoted_price: Decimal,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GuardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: GuardEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(GuardEvent::SequencerDown {
            chain_id: 10,
            since: Some(5),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            GuardEvent::SequencerDown {
                chain_id: 10,
                since: Some(5)
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        EventBus::new().emit(GuardEvent::SequencerDown {
            chain_id: 10,
            since: None,
        });
    }
}
