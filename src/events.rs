use crate::broker::request::RequestStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the broker for notification surfaces and waiting
/// callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// A prompt should be shown to the user right now. Biometric-tier
    /// prompts are individual; everything else replaces the single shared
    /// surface.
    PromptActive {
        id: String,
        tool: String,
        detail: String,
        biometric: bool,
    },
    /// The shared summary surface changed: "`waiting` permissions waiting
    /// for review". `waiting == 0` clears the surface.
    PromptSummary { waiting: usize },
    /// A request reached a terminal status.
    PromptResolved { id: String, status: RequestStatus },
}

pub type EventSender = broadcast::Sender<BrokerEvent>;
pub type EventReceiver = broadcast::Receiver<BrokerEvent>;

/// Create a broadcast event bus with the given capacity.
pub fn event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}
