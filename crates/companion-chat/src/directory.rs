//! Cached user directory and chat set.
//!
//! Both collections are replaced wholesale on refresh. A failed refresh never
//! surfaces as an error: it is logged and the seed data takes its place, so
//! the access policy always has something to evaluate against.

use std::collections::BTreeMap;

use tracing::{info, warn};

use companion_net::ChatBackend;
use companion_shared::types::{Chat, ChatId, Identity, UserId};

use crate::seed;

/// Where the current directory contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    Empty,
    Backend,
    Seed,
}

#[derive(Debug, Clone)]
pub struct DirectoryCache {
    users: BTreeMap<UserId, Identity>,
    chats: BTreeMap<ChatId, Chat>,
    users_source: DirectorySource,
    chats_source: DirectorySource,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            users: BTreeMap::new(),
            chats: BTreeMap::new(),
            users_source: DirectorySource::Empty,
            chats_source: DirectorySource::Empty,
        }
    }

    /// Replace the user directory from the backend, or from the seed on failure.
    pub async fn refresh_users(&mut self, backend: &dyn ChatBackend, credential: &str) {
        match backend.list_users(credential).await {
            Ok(users) => {
                info!(count = users.len(), "User directory refreshed");
                self.replace_users(users, DirectorySource::Backend);
            }
            Err(e) => {
                warn!(error = %e, "User directory fetch failed, using seed directory");
                self.replace_users(seed::seed_users(), DirectorySource::Seed);
            }
        }
    }

    /// Replace the chat set visible to `self_id`, or use the seed on failure.
    pub async fn refresh_chats(
        &mut self,
        backend: &dyn ChatBackend,
        credential: &str,
        self_id: UserId,
    ) {
        match backend.list_chats(credential, self_id).await {
            Ok(chats) => {
                info!(count = chats.len(), user = %self_id, "Chat list refreshed");
                self.replace_chats(chats, DirectorySource::Backend);
            }
            Err(e) => {
                warn!(error = %e, user = %self_id, "Chat list fetch failed, using seed chats");
                self.replace_chats(seed::seed_chats(), DirectorySource::Seed);
            }
        }
    }

    pub fn replace_users(&mut self, users: Vec<Identity>, source: DirectorySource) {
        self.users = users.into_iter().map(|u| (u.id, u)).collect();
        self.users_source = source;
    }

    pub fn replace_chats(&mut self, chats: Vec<Chat>, source: DirectorySource) {
        self.chats = chats.into_iter().map(|c| (c.id, c)).collect();
        self.chats_source = source;
    }

    pub fn upsert_chat(&mut self, chat: Chat) {
        self.chats.insert(chat.id, chat);
    }

    pub fn user(&self, id: UserId) -> Option<&Identity> {
        self.users.get(&id)
    }

    pub fn chat(&self, id: ChatId) -> Option<&Chat> {
        self.chats.get(&id)
    }

    /// Users in ascending id order.
    pub fn users(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }

    /// Chats in ascending id order.
    pub fn chats(&self) -> impl Iterator<Item = &Chat> {
        self.chats.values()
    }

    pub fn find_chat_for_pair(&self, a: UserId, b: UserId) -> Option<&Chat> {
        self.chats.values().find(|c| c.involves_pair(a, b))
    }

    /// One greater than the highest known chat id, or 1 when there are none.
    pub fn next_local_chat_id(&self) -> ChatId {
        self.chats
            .keys()
            .next_back()
            .map_or(ChatId(1), |max| max.next())
    }

    pub fn users_source(&self) -> DirectorySource {
        self.users_source
    }

    pub fn chats_source(&self) -> DirectorySource {
        self.chats_source
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}
