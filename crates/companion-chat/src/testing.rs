//! In-memory backend and connector used by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use companion_net::error::Result;
use companion_net::{
    ChatBackend, NetError, RealtimeCommand, RealtimeConfig, RealtimeConnector, RealtimeLink,
    RealtimeNotification,
};
use companion_shared::types::{Chat, ChatId, Identity, Message, RoleSet, UserId};

const BASE: i64 = 1_725_267_600;

fn at(offset_secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(BASE + offset_secs, 0).unwrap()
}

pub fn admin(id: i64) -> Identity {
    Identity::new(id, "Admin", &id.to_string(), RoleSet::admin())
}

pub fn user(id: i64) -> Identity {
    Identity::new(id, "User", &id.to_string(), RoleSet::new(["user"]))
}

pub fn chat(id: i64, a: i64, b: i64) -> Chat {
    Chat {
        id: ChatId(id),
        participant_a: UserId(a),
        participant_b: UserId(b),
        created_at: at(id),
    }
}

pub fn message(chat_id: i64, sender: i64, content: &str, offset_secs: i64) -> Message {
    Message {
        chat_id: ChatId(chat_id),
        sender_id: UserId(sender),
        content: content.to_string(),
        sent_at: at(offset_secs),
    }
}

/// Unsigned JWT carrying the claims the identity resolver reads.
pub fn credential(id: i64, roles: &[&str]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "id": id,
        "firstName": "User",
        "surname": id.to_string(),
        "roles": roles,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Backend holding users and chats in memory, with get-or-create semantics.
#[derive(Default)]
pub struct FakeBackend {
    users: Vec<Identity>,
    chats: Mutex<Vec<Chat>>,
    fail: bool,
    get_or_create_calls: Mutex<usize>,
}

impl FakeBackend {
    pub fn new(users: Vec<Identity>, chats: Vec<Chat>) -> Self {
        Self {
            users,
            chats: Mutex::new(chats),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn get_or_create_calls(&self) -> usize {
        *self.get_or_create_calls.lock().unwrap()
    }

    fn unavailable(path: &str) -> NetError {
        NetError::Status {
            method: "GET",
            path: path.to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_users(&self, _credential: &str) -> Result<Vec<Identity>> {
        if self.fail {
            return Err(Self::unavailable("/users"));
        }
        Ok(self.users.clone())
    }

    async fn list_chats(&self, _credential: &str, user_id: UserId) -> Result<Vec<Chat>> {
        if self.fail {
            return Err(Self::unavailable("/chats"));
        }
        let chats = self.chats.lock().unwrap();
        let is_admin = self
            .users
            .iter()
            .any(|u| u.id == user_id && u.is_admin());
        Ok(chats
            .iter()
            .filter(|c| is_admin || c.involves(user_id))
            .cloned()
            .collect())
    }

    async fn get_or_create_chat(
        &self,
        _credential: &str,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Chat> {
        *self.get_or_create_calls.lock().unwrap() += 1;
        if self.fail {
            return Err(Self::unavailable("/chats/get-or-create"));
        }
        let mut chats = self.chats.lock().unwrap();
        if let Some(existing) = chats.iter().find(|c| c.involves_pair(user_a, user_b)) {
            return Ok(existing.clone());
        }
        let next = chats.iter().map(|c| c.id.0).max().unwrap_or(0) + 100;
        let created = chat(next, user_a.0, user_b.0);
        chats.push(created.clone());
        Ok(created)
    }
}

/// The far side of a link handed out by [`FakeConnector`].
pub struct RemoteEnd {
    pub config: RealtimeConfig,
    pub commands: mpsc::Receiver<RealtimeCommand>,
    pub notifications: mpsc::Sender<RealtimeNotification>,
}

impl RemoteEnd {
    pub async fn notify(&self, notification: RealtimeNotification) {
        self.notifications.send(notification).await.unwrap();
    }
}

/// Connector that records every opened link instead of touching the network.
#[derive(Default)]
pub struct FakeConnector {
    remotes: Mutex<Vec<RemoteEnd>>,
    opened: Mutex<usize>,
}

impl FakeConnector {
    pub fn opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }

    /// Most recently opened link.
    pub fn take_remote(&self) -> RemoteEnd {
        self.remotes.lock().unwrap().pop().expect("no link opened")
    }

    pub fn take_first_remote(&self) -> RemoteEnd {
        self.remotes.lock().unwrap().remove(0)
    }
}

impl RealtimeConnector for FakeConnector {
    fn open(&self, config: RealtimeConfig) -> RealtimeLink {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (notif_tx, notif_rx) = mpsc::channel(64);
        *self.opened.lock().unwrap() += 1;
        self.remotes.lock().unwrap().push(RemoteEnd {
            config,
            commands: cmd_rx,
            notifications: notif_tx,
        });
        RealtimeLink {
            commands: cmd_tx,
            notifications: notif_rx,
        }
    }
}
