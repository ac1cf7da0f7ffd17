//! Realtime transport and its connection state machine.
//!
//! ```text
//! disconnected --connect--> connecting --ack--> connected
//! connecting --failure--> degraded-mock
//! connected  --failure--> degraded-mock
//! any        --close-->   disconnected
//! ```
//!
//! `degraded-mock` is never left automatically. History requests are
//! serialized: one is outstanding at a time and the next answer on the
//! history queue is attributed to it. An outstanding request that gets an
//! unreadable answer, or none within the history timeout, is given up and
//! the next queued request goes out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use companion_net::{
    RealtimeCommand, RealtimeConfig, RealtimeConnector, RealtimeLink, RealtimeNotification,
};
use companion_shared::protocol::OutgoingMessage;
use companion_shared::types::{ChatId, ConnectionState, Identity, Message, UserId};

use crate::config::ChatConfig;

/// What a realtime notification means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// Entered degraded-mock after a failure. Reported once per episode.
    Failed(String),
    Message(Message),
    History { chat_id: ChatId, messages: Vec<Message> },
}

pub struct Transport {
    connector: Arc<dyn RealtimeConnector>,
    realtime_url: String,
    connect_timeout: Duration,
    history_timeout: Duration,
    force_mock: bool,
    state: ConnectionState,
    /// User and credential the current connection belongs to.
    owner: Option<(UserId, String)>,
    link: Option<RealtimeLink>,
    /// Outstanding history request and when it was issued.
    history_in_flight: Option<(ChatId, Instant)>,
    history_queue: VecDeque<ChatId>,
}

impl Transport {
    pub fn new(connector: Arc<dyn RealtimeConnector>, config: &ChatConfig) -> Self {
        Self {
            connector,
            realtime_url: config.realtime_url.clone(),
            connect_timeout: config.connect_timeout,
            history_timeout: config.history_timeout,
            force_mock: config.force_mock,
            state: ConnectionState::Disconnected,
            owner: None,
            link: None,
            history_in_flight: None,
            history_queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn is_mock(&self) -> bool {
        self.state == ConnectionState::DegradedMock
    }

    pub fn pending_history(&self) -> Option<ChatId> {
        self.history_in_flight.map(|(chat_id, _)| chat_id)
    }

    fn history_deadline(&self) -> Option<Instant> {
        self.history_in_flight
            .map(|(_, issued)| issued + self.history_timeout)
    }

    /// Open the realtime connection for `identity`.
    ///
    /// A no-op when a connection for the same user and credential already
    /// exists; a different user or credential tears the old one down first.
    pub fn connect(&mut self, identity: &Identity, credential: &str) {
        if let Some((owner, owner_credential)) = &self.owner {
            if *owner == identity.id
                && owner_credential == credential
                && self.state != ConnectionState::Disconnected
            {
                debug!(user = %identity.id, state = %self.state, "Already connected, ignoring connect");
                return;
            }
            info!(previous = %owner, next = %identity.id, "Replacing realtime connection");
            self.close();
        }

        self.owner = Some((identity.id, credential.to_string()));

        if self.force_mock {
            info!(user = %identity.id, "Realtime disabled by configuration, entering degraded-mock");
            self.state = ConnectionState::DegradedMock;
            return;
        }

        let mut config = RealtimeConfig::new(&self.realtime_url, credential, identity.id);
        config.connect_timeout = self.connect_timeout;
        self.link = Some(self.connector.open(config));
        self.state = ConnectionState::Connecting;
        info!(user = %identity.id, url = %self.realtime_url, "Realtime connecting");
    }

    /// Wait for the next notification from the realtime task.
    ///
    /// Pends forever without a connection. Yields `HistoryDropped` once the
    /// outstanding history request outlives the history timeout. Cancel safe.
    pub async fn next_notification(&mut self) -> RealtimeNotification {
        let deadline = self.history_deadline();
        let Some(link) = self.link.as_mut() else {
            return std::future::pending().await;
        };
        let received = match deadline {
            Some(deadline) => tokio::select! {
                received = link.notifications.recv() => received,
                _ = tokio::time::sleep_until(deadline) => {
                    return RealtimeNotification::HistoryDropped;
                }
            },
            None => link.notifications.recv().await,
        };
        match received {
            Some(notification) => notification,
            None => {
                self.link = None;
                RealtimeNotification::Failed("realtime task ended".to_string())
            }
        }
    }

    /// Apply a notification to the state machine.
    pub fn handle(&mut self, notification: RealtimeNotification) -> Option<TransportEvent> {
        match notification {
            RealtimeNotification::Connected => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = %self.state, "Ignoring late connect acknowledgement");
                    return None;
                }
                self.state = ConnectionState::Connected;
                info!("Realtime connected");
                Some(TransportEvent::StateChanged(ConnectionState::Connected))
            }
            RealtimeNotification::Failed(reason) => {
                if !matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    debug!(state = %self.state, reason = %reason, "Ignoring failure outside a live episode");
                    return None;
                }
                warn!(reason = %reason, "Realtime failed, entering degraded-mock");
                self.state = ConnectionState::DegradedMock;
                self.link = None;
                self.history_in_flight = None;
                self.history_queue.clear();
                Some(TransportEvent::Failed(reason))
            }
            RealtimeNotification::MessageReceived(message) => {
                if !self.is_live() {
                    return None;
                }
                Some(TransportEvent::Message(message))
            }
            RealtimeNotification::HistoryReceived(messages) => {
                if !self.is_live() {
                    return None;
                }
                let chat_id = match self.history_in_flight.take() {
                    Some((id, _)) => id,
                    None => {
                        let Some(first) = messages.first() else {
                            debug!("Empty history with no outstanding request");
                            return None;
                        };
                        debug!(chat = %first.chat_id, "Unrequested history, attributing by content");
                        first.chat_id
                    }
                };
                self.issue_next_history();

                let total = messages.len();
                let messages: Vec<Message> =
                    messages.into_iter().filter(|m| m.chat_id == chat_id).collect();
                if messages.len() != total {
                    debug!(
                        chat = %chat_id,
                        dropped = total - messages.len(),
                        "History contained messages for other chats"
                    );
                }
                Some(TransportEvent::History { chat_id, messages })
            }
            RealtimeNotification::HistoryDropped => {
                if !self.is_live() {
                    return None;
                }
                if let Some((chat_id, issued)) = self.history_in_flight.take() {
                    warn!(
                        chat = %chat_id,
                        waited_ms = issued.elapsed().as_millis() as u64,
                        "History request got no usable answer, moving on"
                    );
                }
                self.issue_next_history();
                None
            }
            RealtimeNotification::Closed => {
                self.link = None;
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                self.state = ConnectionState::Disconnected;
                Some(TransportEvent::StateChanged(ConnectionState::Disconnected))
            }
        }
    }

    /// Ask for a chat's history. Only while connected; queued behind an
    /// outstanding request.
    pub fn request_history(&mut self, chat_id: ChatId) {
        if !self.is_live() {
            debug!(chat = %chat_id, state = %self.state, "History request while not connected, ignoring");
            return;
        }
        if self.history_deadline().is_some_and(|deadline| Instant::now() >= deadline) {
            self.handle(RealtimeNotification::HistoryDropped);
        }
        if self.pending_history() == Some(chat_id) || self.history_queue.contains(&chat_id) {
            return;
        }
        if self.history_in_flight.is_some() {
            debug!(chat = %chat_id, "History request queued");
            self.history_queue.push_back(chat_id);
            return;
        }
        self.history_in_flight = Some((chat_id, Instant::now()));
        self.command(RealtimeCommand::RequestHistory(chat_id));
    }

    fn issue_next_history(&mut self) {
        if let Some(next) = self.history_queue.pop_front() {
            self.history_in_flight = Some((next, Instant::now()));
            self.command(RealtimeCommand::RequestHistory(next));
        }
    }

    /// Publish a message. Silently ignored unless connected; never retried.
    pub fn send(&mut self, chat_id: ChatId, sender_id: UserId, content: &str) {
        if !self.is_live() {
            debug!(chat = %chat_id, state = %self.state, "Send while not connected, ignoring");
            return;
        }
        self.command(RealtimeCommand::Send(OutgoingMessage {
            chat_id,
            sender_id,
            content: content.to_string(),
        }));
    }

    fn command(&self, command: RealtimeCommand) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        match link.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(command = ?command, "Realtime command queue full, dropping");
            }
            Err(TrySendError::Closed(command)) => {
                debug!(command = ?command, "Realtime task gone, dropping command");
            }
        }
    }

    /// Tear down: unsubscribe, disconnect, and stop all further notifications.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.commands.try_send(RealtimeCommand::Shutdown);
        }
        if self.state != ConnectionState::Disconnected {
            info!(state = %self.state, "Realtime transport closed");
        }
        self.state = ConnectionState::Disconnected;
        self.owner = None;
        self.history_in_flight = None;
        self.history_queue.clear();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, message, user, FakeConnector};

    fn transport(connector: &Arc<FakeConnector>) -> Transport {
        Transport::new(connector.clone(), &ChatConfig::default())
    }

    #[tokio::test]
    async fn test_connect_then_ack() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);

        t.connect(&user(3), "tok");
        assert_eq!(t.state(), ConnectionState::Connecting);
        let remote = connector.take_remote();
        assert_eq!(remote.config.user_id, UserId(3));

        remote.notify(RealtimeNotification::Connected).await;
        let n = t.next_notification().await;
        assert_eq!(
            t.handle(n),
            Some(TransportEvent::StateChanged(ConnectionState::Connected))
        );
        assert!(t.is_live());
    }

    #[tokio::test]
    async fn test_failure_while_connecting_reported_once() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&user(3), "tok");
        let remote = connector.take_remote();

        remote.notify(RealtimeNotification::Failed("refused".into())).await;
        let n = t.next_notification().await;
        assert_eq!(t.handle(n), Some(TransportEvent::Failed("refused".into())));
        assert_eq!(t.state(), ConnectionState::DegradedMock);

        assert_eq!(t.handle(RealtimeNotification::Failed("again".into())), None);
        assert_eq!(t.handle(RealtimeNotification::Connected), None);
        assert_eq!(t.state(), ConnectionState::DegradedMock);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_per_identity() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);

        t.connect(&user(3), "tok");
        t.handle(RealtimeNotification::Connected);
        t.connect(&user(3), "tok");
        assert_eq!(connector.opened(), 1);
        assert!(t.is_live());

        t.connect(&admin(1), "other");
        assert_eq!(connector.opened(), 2);
        assert_eq!(t.state(), ConnectionState::Connecting);

        let mut first = connector.take_first_remote();
        assert_eq!(first.commands.recv().await, Some(RealtimeCommand::Shutdown));
    }

    #[tokio::test]
    async fn test_send_and_history_need_connection() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&user(3), "tok");
        t.send(ChatId(1), UserId(3), "early");
        t.request_history(ChatId(1));
        assert_eq!(t.pending_history(), None);

        t.handle(RealtimeNotification::Connected);
        t.send(ChatId(1), UserId(3), "hello");

        let mut remote = connector.take_remote();
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::Send(OutgoingMessage {
                chat_id: ChatId(1),
                sender_id: UserId(3),
                content: "hello".into(),
            }))
        );
        assert!(remote.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_history_requests_are_serialized() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&admin(1), "tok");
        t.handle(RealtimeNotification::Connected);
        let mut remote = connector.take_remote();

        t.request_history(ChatId(1));
        t.request_history(ChatId(2));
        t.request_history(ChatId(2));
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(1)))
        );
        assert!(remote.commands.try_recv().is_err());

        let event = t.handle(RealtimeNotification::HistoryReceived(vec![
            message(1, 3, "a", 0),
            message(2, 4, "stray", 1),
        ]));
        assert_eq!(
            event,
            Some(TransportEvent::History {
                chat_id: ChatId(1),
                messages: vec![message(1, 3, "a", 0)],
            })
        );
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(2)))
        );

        let event = t.handle(RealtimeNotification::HistoryReceived(vec![]));
        assert_eq!(
            event,
            Some(TransportEvent::History {
                chat_id: ChatId(2),
                messages: vec![],
            })
        );
        assert_eq!(t.pending_history(), None);
    }

    #[tokio::test]
    async fn test_unreadable_history_answer_releases_queue() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&admin(1), "tok");
        t.handle(RealtimeNotification::Connected);
        let mut remote = connector.take_remote();

        t.request_history(ChatId(1));
        t.request_history(ChatId(2));
        assert_eq!(t.handle(RealtimeNotification::HistoryDropped), None);

        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(1)))
        );
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(2)))
        );
        assert_eq!(t.pending_history(), Some(ChatId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_history_times_out() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&user(3), "tok");
        t.handle(RealtimeNotification::Connected);
        let mut remote = connector.take_remote();

        t.request_history(ChatId(1));
        t.request_history(ChatId(2));
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(1)))
        );
        assert!(remote.commands.try_recv().is_err());

        let n = t.next_notification().await;
        assert_eq!(n, RealtimeNotification::HistoryDropped);
        assert_eq!(t.handle(n), None);
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(2)))
        );
        assert!(t.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_history_request_does_not_block_next() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&user(3), "tok");
        t.handle(RealtimeNotification::Connected);
        let mut remote = connector.take_remote();

        t.request_history(ChatId(1));
        t.request_history(ChatId(1));
        assert_eq!(t.pending_history(), Some(ChatId(1)));

        tokio::time::advance(ChatConfig::default().history_timeout + Duration::from_secs(1)).await;
        t.request_history(ChatId(2));

        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(1)))
        );
        assert_eq!(
            remote.commands.try_recv().ok(),
            Some(RealtimeCommand::RequestHistory(ChatId(2)))
        );
        assert_eq!(t.pending_history(), Some(ChatId(2)));
    }

    #[tokio::test]
    async fn test_close_stops_notifications() {
        let connector = Arc::new(FakeConnector::default());
        let mut t = transport(&connector);
        t.connect(&user(3), "tok");
        t.handle(RealtimeNotification::Connected);
        let mut remote = connector.take_remote();

        t.close();
        assert_eq!(t.state(), ConnectionState::Disconnected);
        assert_eq!(remote.commands.recv().await, Some(RealtimeCommand::Shutdown));
        assert!(remote
            .notifications
            .send(RealtimeNotification::MessageReceived(message(1, 1, "late", 0)))
            .await
            .is_err());
    }

    #[test]
    fn test_forced_mock_skips_network() {
        let connector = Arc::new(FakeConnector::default());
        let config = ChatConfig {
            force_mock: true,
            ..ChatConfig::default()
        };
        let mut t = Transport::new(connector.clone(), &config);
        t.connect(&user(3), "tok");
        assert_eq!(t.state(), ConnectionState::DegradedMock);
        assert_eq!(connector.opened(), 0);
    }
}
