//! Local message state.
//!
//! Messages are kept per chat in `sent_at` order. A message whose chat is
//! not known yet is still stored; the session simply does not render it
//! until the chat shows up.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use companion_shared::types::{ChatId, Message};

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    by_chat: BTreeMap<ChatId, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, keeping `sent_at` order. Equal timestamps keep arrival order.
    pub fn append(&mut self, message: Message) {
        let list = self.by_chat.entry(message.chat_id).or_default();
        let at = list.partition_point(|m| m.sent_at <= message.sent_at);
        list.insert(at, message);
    }

    /// Replace a chat's messages wholesale (last write wins).
    pub fn replace(&mut self, chat_id: ChatId, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.sent_at);
        self.by_chat.insert(chat_id, messages);
    }

    pub fn for_chat(&self, chat_id: ChatId) -> &[Message] {
        self.by_chat.get(&chat_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn count(&self, chat_id: ChatId) -> usize {
        self.for_chat(chat_id).len()
    }

    pub fn last_activity(&self, chat_id: ChatId) -> Option<DateTime<Utc>> {
        self.for_chat(chat_id).last().map(|m| m.sent_at)
    }

    pub fn is_empty(&self) -> bool {
        self.by_chat.values().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.by_chat.clear();
    }
}
