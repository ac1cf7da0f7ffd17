//! Async HTTP client for the companion REST backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use companion_shared::protocol::ChatPairRequest;
use companion_shared::types::{Chat, Identity, UserId};

use crate::backend::ChatBackend;
use crate::error::{NetError, Result};

/// REST client bound to one backend base URL.
///
/// Cheap to clone; the inner [`reqwest::Client`] is reference counted.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder, credential: &str) -> RequestBuilder {
        req.bearer_auth(credential)
    }

    async fn parse<T: DeserializeOwned>(
        resp: Response,
        method: &'static str,
        path: &str,
    ) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        debug!(method, path, len = body.len(), "Backend response received");
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatBackend for RestClient {
    async fn list_users(&self, credential: &str) -> Result<Vec<Identity>> {
        let resp = self
            .authorized(self.client.get(self.url("/users")), credential)
            .send()
            .await?;
        Self::parse(resp, "GET", "/users").await
    }

    async fn list_chats(&self, credential: &str, user_id: UserId) -> Result<Vec<Chat>> {
        let resp = self
            .authorized(self.client.get(self.url("/chats")), credential)
            .query(&[("userId", user_id.0)])
            .send()
            .await?;
        Self::parse(resp, "GET", "/chats").await
    }

    async fn get_or_create_chat(
        &self,
        credential: &str,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Chat> {
        let body = ChatPairRequest {
            user_a_id: user_a,
            user_b_id: user_b,
        };
        let resp = self
            .authorized(self.client.post(self.url("/chats/get-or-create")), credential)
            .json(&body)
            .send()
            .await?;
        Self::parse(resp, "POST", "/chats/get-or-create").await
    }
}
