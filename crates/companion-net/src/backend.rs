//! The REST backend as seen by the chat client.

use async_trait::async_trait;

use companion_shared::types::{Chat, Identity, UserId};

use crate::error::Result;

/// Operations the chat client needs from the REST backend.
///
/// Every call carries the caller's bearer credential.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /users`
    async fn list_users(&self, credential: &str) -> Result<Vec<Identity>>;

    /// `GET /chats?userId=<id>`
    async fn list_chats(&self, credential: &str, user_id: UserId) -> Result<Vec<Chat>>;

    /// `POST /chats/get-or-create`; the same unordered pair always yields the same chat.
    async fn get_or_create_chat(
        &self,
        credential: &str,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Chat>;
}
