//! The chat session: identity, directory, policy and transport behind the
//! operations a UI calls.
//!
//! A session is a single writer. Every mutation goes through `&mut self`,
//! and inbound realtime traffic is applied only from [`ChatSession::process_next`],
//! so an update is never observed half done.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use companion_net::{
    ChatBackend, NetError, RealtimeConnector, RealtimeNotification, RestClient, WebSocketConnector,
};
use companion_shared::identity;
use companion_shared::types::{Chat, ChatId, ConnectionState, Identity, Message, UserId};

use crate::config::ChatConfig;
use crate::directory::{DirectoryCache, DirectorySource};
use crate::events::{ChatEvent, EventBus};
use crate::policy;
use crate::seed;
use crate::state::MessageStore;
use crate::transport::{Transport, TransportEvent};

/// A simulated counterpart reply, tagged with the login it belongs to.
#[derive(Debug)]
struct MockReply {
    generation: u64,
    message: Message,
}

enum Incoming {
    Realtime(RealtimeNotification),
    Reply(MockReply),
}

pub struct ChatSession {
    config: ChatConfig,
    backend: Arc<dyn ChatBackend>,
    transport: Transport,
    bus: EventBus,
    directory: DirectoryCache,
    messages: MessageStore,
    identity: Option<Identity>,
    credential: Option<String>,
    active_chat: Option<ChatId>,
    generation: u64,
    replies_tx: mpsc::UnboundedSender<MockReply>,
    replies_rx: mpsc::UnboundedReceiver<MockReply>,
}

impl ChatSession {
    pub fn new(
        config: ChatConfig,
        backend: Arc<dyn ChatBackend>,
        connector: Arc<dyn RealtimeConnector>,
        bus: EventBus,
    ) -> Self {
        let transport = Transport::new(connector, &config);
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            config,
            backend,
            transport,
            bus,
            directory: DirectoryCache::new(),
            messages: MessageStore::new(),
            identity: None,
            credential: None,
            active_chat: None,
            generation: 0,
            replies_tx,
            replies_rx,
        }
    }

    /// Session against the configured REST backend and realtime endpoint.
    pub fn connect_with(config: ChatConfig, bus: EventBus) -> Result<Self, NetError> {
        let backend = RestClient::new(&config.api_base_url, config.request_timeout)?;
        Ok(Self::new(
            config,
            Arc::new(backend),
            Arc::new(WebSocketConnector),
            bus,
        ))
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn active_chat(&self) -> Option<ChatId> {
        self.active_chat
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Authenticate with a bearer credential, load the directory and open
    /// the realtime connection. `None` leaves the session unauthenticated.
    pub async fn login(&mut self, credential: &str) -> Option<Identity> {
        let Some(identity) = identity::decode(credential) else {
            warn!("Login with a credential that does not resolve to an identity");
            return None;
        };

        let same_user = self.identity.as_ref().is_some_and(|i| i.id == identity.id);
        if self.identity.is_some() && !same_user {
            self.logout();
        }

        info!(user = %identity.id, admin = identity.is_admin(), "Session authenticated");
        self.identity = Some(identity.clone());
        self.credential = Some(credential.to_string());

        self.refresh_directory().await;

        let before = self.transport.state();
        self.transport.connect(&identity, credential);
        self.after_transition(before);

        Some(identity)
    }

    /// Tear down the transport and forget everything tied to the identity.
    pub fn logout(&mut self) {
        let before = self.transport.state();
        self.transport.close();
        self.after_transition(before);

        if let Some(identity) = self.identity.take() {
            info!(user = %identity.id, "Session logged out");
        }
        self.credential = None;
        self.active_chat = None;
        self.messages.clear();
        self.directory.clear();
        self.generation += 1;
    }

    /// Refetch users and chats. Failures fall back to the seed data.
    pub async fn refresh_directory(&mut self) {
        let (Some(identity), Some(credential)) = (self.identity.as_ref(), self.credential.as_ref())
        else {
            debug!("Directory refresh without an identity, ignoring");
            return;
        };
        let self_id = identity.id;

        self.directory
            .refresh_users(self.backend.as_ref(), credential)
            .await;
        self.directory
            .refresh_chats(self.backend.as_ref(), credential, self_id)
            .await;

        self.bus.publish(ChatEvent::DirectoryUpdated);
        self.bus.publish(ChatEvent::ChatsUpdated);
    }

    // -----------------------------------------------------------------------
    // Conversation operations
    // -----------------------------------------------------------------------

    /// Open (or reopen) the caller's support conversation with an admin.
    ///
    /// Live: the backend's get-or-create decides the chat. Degraded-mock: an
    /// existing local chat for the pair is reused, otherwise one is
    /// synthesized with the next local id.
    pub async fn start_support_chat(&mut self) -> Option<Chat> {
        let identity = self.identity.clone()?;
        let Some(counterpart) = policy::find_eligible_counterpart(
            &identity,
            &self.directory,
            self.config.support_admin_id,
        ) else {
            debug!(user = %identity.id, "No eligible support counterpart");
            return None;
        };
        if !policy::can_initiate(&identity, counterpart.id, &self.directory) {
            return None;
        }

        let chat = match self.transport.state() {
            ConnectionState::Connected => {
                let credential = self.credential.clone()?;
                match self
                    .backend
                    .get_or_create_chat(&credential, identity.id, counterpart.id)
                    .await
                {
                    Ok(chat) => chat,
                    Err(e) => {
                        warn!(error = %e, admin = %counterpart.id, "Support chat get-or-create failed");
                        return None;
                    }
                }
            }
            ConnectionState::DegradedMock => {
                match self.directory.find_chat_for_pair(identity.id, counterpart.id) {
                    Some(existing) => existing.clone(),
                    None => Chat {
                        id: self.directory.next_local_chat_id(),
                        participant_a: identity.id,
                        participant_b: counterpart.id,
                        created_at: Utc::now(),
                    },
                }
            }
            state => {
                debug!(state = %state, "Support chat requested before the transport settled");
                return None;
            }
        };

        if self.directory.chat(chat.id) != Some(&chat) {
            info!(chat = %chat.id, admin = %counterpart.id, "Support chat added");
            self.directory.upsert_chat(chat.clone());
            self.bus.publish(ChatEvent::ChatsUpdated);
        }
        self.open_chat(&chat);
        Some(chat)
    }

    /// Make `chat_id` the active chat and load its history, when the caller may view it.
    pub fn select_chat(&mut self, chat_id: ChatId) {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        let Some(chat) = self.directory.chat(chat_id).cloned() else {
            debug!(chat = %chat_id, "Select of unknown chat, ignoring");
            return;
        };
        if !policy::can_view(identity, &chat) {
            debug!(chat = %chat_id, user = %identity.id, "Select of foreign chat refused");
            return;
        }
        self.open_chat(&chat);
    }

    fn open_chat(&mut self, chat: &Chat) {
        self.active_chat = Some(chat.id);
        self.bus.publish(ChatEvent::ChatOpened(chat.clone()));

        if self.transport.is_live() {
            self.transport.request_history(chat.id);
        } else if self.transport.is_mock() {
            self.bus.publish(ChatEvent::HistoryLoaded {
                chat_id: chat.id,
                messages: self.messages.for_chat(chat.id).to_vec(),
            });
        }
    }

    /// Send `content` to a chat the caller may view. Blank content is ignored.
    pub fn send_message(&mut self, chat_id: ChatId, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        let Some(chat) = self.directory.chat(chat_id) else {
            debug!(chat = %chat_id, "Send to unknown chat, ignoring");
            return;
        };
        if !policy::can_view(identity, chat) {
            debug!(chat = %chat_id, user = %identity.id, "Send to foreign chat refused");
            return;
        }

        match self.transport.state() {
            ConnectionState::Connected => {
                self.transport.send(chat_id, identity.id, content);
            }
            ConnectionState::DegradedMock => {
                let message = Message {
                    chat_id,
                    sender_id: identity.id,
                    content: content.to_string(),
                    sent_at: Utc::now(),
                };
                self.messages.append(message.clone());
                self.bus.publish(ChatEvent::MessageReceived(message));

                if !identity.is_admin() {
                    if let Some(other) = chat.counterpart(identity.id) {
                        self.schedule_reply(chat_id, other);
                    }
                }
            }
            state => {
                debug!(chat = %chat_id, state = %state, "Send before the transport settled, ignoring");
            }
        }
    }

    fn schedule_reply(&self, chat_id: ChatId, from: UserId) {
        let tx = self.replies_tx.clone();
        let delay = self.config.mock_reply_delay;
        let content = self.config.mock_reply_text.clone();
        let generation = self.generation;
        debug!(chat = %chat_id, from = %from, delay_ms = delay.as_millis() as u64, "Simulated reply scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let message = Message {
                chat_id,
                sender_id: from,
                content,
                sent_at: Utc::now(),
            };
            let _ = tx.send(MockReply { generation, message });
        });
    }

    /// Chats the caller may see, most recent activity first.
    pub fn visible_chat_list(&self) -> Vec<Chat> {
        let Some(identity) = self.identity.as_ref() else {
            return Vec::new();
        };
        let mut chats = policy::visible_chats(identity, self.directory.chats(), &self.directory);
        chats.sort_by_key(|chat| {
            let activity = self.messages.last_activity(chat.id).unwrap_or(chat.created_at);
            (Reverse(activity), chat.id)
        });
        chats
    }

    /// Messages of a known, viewable chat in `sent_at` order.
    pub fn messages(&self, chat_id: ChatId) -> Vec<Message> {
        let Some(identity) = self.identity.as_ref() else {
            return Vec::new();
        };
        match self.directory.chat(chat_id) {
            Some(chat) if policy::can_view(identity, chat) => {
                self.messages.for_chat(chat_id).to_vec()
            }
            _ => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Inbound traffic
    // -----------------------------------------------------------------------

    /// Wait for the next realtime notification or simulated reply, apply it
    /// and publish the resulting events. Returns them as well; the list is
    /// empty when the input changed nothing.
    pub async fn process_next(&mut self) -> Vec<ChatEvent> {
        let incoming = tokio::select! {
            notification = self.transport.next_notification() => Incoming::Realtime(notification),
            Some(reply) = self.replies_rx.recv() => Incoming::Reply(reply),
        };

        let events = match incoming {
            Incoming::Realtime(notification) => self.apply_notification(notification).await,
            Incoming::Reply(reply) => self.apply_reply(reply),
        };
        for event in &events {
            self.bus.publish(event.clone());
        }
        events
    }

    async fn apply_notification(&mut self, notification: RealtimeNotification) -> Vec<ChatEvent> {
        let Some(event) = self.transport.handle(notification) else {
            return Vec::new();
        };

        match event {
            TransportEvent::StateChanged(state) => {
                if state == ConnectionState::Connected {
                    if let Some(active) = self.active_chat {
                        self.transport.request_history(active);
                    }
                }
                vec![ChatEvent::ConnectionChanged(state)]
            }
            TransportEvent::Failed(reason) => {
                self.enter_mock();
                vec![
                    ChatEvent::ConnectionChanged(ConnectionState::DegradedMock),
                    ChatEvent::TransportFailed { reason },
                ]
            }
            TransportEvent::Message(message) => {
                let known = self.directory.chat(message.chat_id).is_some();
                self.messages.append(message.clone());
                if known {
                    return vec![ChatEvent::MessageReceived(message)];
                }

                debug!(chat = %message.chat_id, "Message for unknown chat, refreshing chats");
                let mut events = Vec::new();
                if self.reload_chats().await {
                    events.push(ChatEvent::ChatsUpdated);
                }
                if self.directory.chat(message.chat_id).is_some() {
                    events.push(ChatEvent::MessageReceived(message));
                }
                events
            }
            TransportEvent::History { chat_id, messages } => {
                self.messages.replace(chat_id, messages.clone());
                vec![ChatEvent::HistoryLoaded { chat_id, messages }]
            }
        }
    }

    fn apply_reply(&mut self, reply: MockReply) -> Vec<ChatEvent> {
        if reply.generation != self.generation || !self.transport.is_mock() {
            debug!("Dropping simulated reply from a previous session");
            return Vec::new();
        }
        self.messages.append(reply.message.clone());
        vec![ChatEvent::MessageReceived(reply.message)]
    }

    /// Fetch the chat list without the seed fallback; keeps the current set on failure.
    async fn reload_chats(&mut self) -> bool {
        let (Some(identity), Some(credential)) = (self.identity.as_ref(), self.credential.as_ref())
        else {
            return false;
        };
        match self.backend.list_chats(credential, identity.id).await {
            Ok(chats) => {
                self.directory.replace_chats(chats, DirectorySource::Backend);
                true
            }
            Err(e) => {
                warn!(error = %e, "Chat reload failed, keeping current chats");
                false
            }
        }
    }

    fn enter_mock(&mut self) {
        if self.messages.is_empty() && self.directory.chats_source() == DirectorySource::Seed {
            info!("Loading seed conversation for degraded-mock mode");
            for message in seed::seed_messages() {
                self.messages.append(message);
            }
        }
    }

    fn after_transition(&mut self, before: ConnectionState) {
        let after = self.transport.state();
        if after == before {
            return;
        }
        if after == ConnectionState::DegradedMock {
            self.enter_mock();
        }
        self.bus.publish(ChatEvent::ConnectionChanged(after));
    }
}
