//! Session events and the publish/subscribe port that carries them.
//!
//! The bus is created by whoever builds the session and handed to it, so
//! separate sessions never share listeners.

use serde::Serialize;
use tokio::sync::broadcast;

use companion_shared::types::{Chat, ChatId, ConnectionState, Message};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// Transport moved to a new connection state.
    ConnectionChanged(ConnectionState),
    /// The realtime transport failed; the session now runs in degraded-mock mode.
    TransportFailed { reason: String },
    /// The user directory was replaced.
    DirectoryUpdated,
    /// The chat set was replaced or extended.
    ChatsUpdated,
    /// A chat became the active one.
    ChatOpened(Chat),
    /// A message was appended to a chat.
    MessageReceived(Message),
    /// The message set of a chat was replaced by a history answer.
    HistoryLoaded { chat_id: ChatId, messages: Vec<Message> },
}

const BUS_CAPACITY: usize = 256;

/// Cloneable handle to one session's event stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Deliver to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
