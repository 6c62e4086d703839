//! Bounded in-process handoff between the webhook receiver and the dispatch
//! workers. At-most-once: an envelope is consumed exactly once and never
//! replayed; in-flight items are lost on process crash.

use relay_messaging::WebhookEnvelope;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<WebhookEnvelope>,
}

impl EventQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<WebhookEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue. Overflow policy is reject-new: a full queue drops
    /// the envelope and returns false.
    pub fn enqueue(&self, envelope: WebhookEnvelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    capacity = self.capacity(),
                    "event queue full; rejecting new envelope"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("event queue closed; dropping envelope");
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
