//! Realtime session task with tokio mpsc command/notification pattern.
//!
//! One task owns the WebSocket for the lifetime of a session. The client
//! talks to it through a command channel and hears back through a
//! notification channel. The task never reconnects: the first failure is
//! reported once and the task ends.

use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use companion_shared::constants::DEFAULT_CONNECT_TIMEOUT_SECS;
use companion_shared::protocol::{HistoryRequest, Inbound, OutgoingMessage};
use companion_shared::stomp::{Command, Frame};
use companion_shared::types::{ChatId, Message, UserId};

use crate::error::{NetError, Result};
use crate::messages::{
    channel_of, decode_inbound, history_request_frame, send_message_frame, subscribe_frame,
    unsubscribe_frame, Channel,
};
use crate::socket::{open_stomp_session, WsStream};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the realtime task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeCommand {
    /// Publish a chat message.
    Send(OutgoingMessage),
    /// Ask for the history of a chat; the answer arrives on the history queue.
    RequestHistory(ChatId),
    /// Unsubscribe, disconnect and end the task.
    Shutdown,
}

/// Notifications sent *from* the realtime task to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeNotification {
    /// Handshake done and both queues subscribed.
    Connected,
    /// A message arrived on the direct-delivery queue.
    MessageReceived(Message),
    /// A history answer arrived on the history queue.
    HistoryReceived(Vec<Message>),
    /// A history answer arrived but its body could not be read.
    HistoryDropped,
    /// The session failed; sent at most once, after which the task ends.
    Failed(String),
    /// The session closed after a `Shutdown` command.
    Closed,
}

/// Parameters for one realtime session.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Realtime endpoint, without the credential parameter.
    pub url: String,
    pub credential: String,
    pub user_id: UserId,
    pub connect_timeout: Duration,
}

impl RealtimeConfig {
    pub fn new(url: &str, credential: &str, user_id: UserId) -> Self {
        Self {
            url: url.to_string(),
            credential: credential.to_string(),
            user_id,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// The client's ends of a running realtime task.
#[derive(Debug)]
pub struct RealtimeLink {
    pub commands: mpsc::Sender<RealtimeCommand>,
    pub notifications: mpsc::Receiver<RealtimeNotification>,
}

/// Opens realtime sessions. The seam between the client and the socket.
pub trait RealtimeConnector: Send + Sync {
    fn open(&self, config: RealtimeConfig) -> RealtimeLink;
}

/// Connector backed by [`spawn_realtime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl RealtimeConnector for WebSocketConnector {
    fn open(&self, config: RealtimeConfig) -> RealtimeLink {
        spawn_realtime(config)
    }
}

/// Spawn the realtime session in a background tokio task.
///
/// Returns immediately; `Connected` or `Failed` follows on the
/// notification channel once the handshake settles.
pub fn spawn_realtime(config: RealtimeConfig) -> RealtimeLink {
    let (cmd_tx, cmd_rx) = mpsc::channel::<RealtimeCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<RealtimeNotification>(256);

    tokio::spawn(async move {
        run_session(config, cmd_rx, notif_tx).await;
    });

    RealtimeLink {
        commands: cmd_tx,
        notifications: notif_rx,
    }
}

type WsSink = SplitSink<WsStream, WsMessage>;

async fn send_frame(sink: &mut WsSink, frame: &Frame) -> Result<()> {
    debug!(command = %frame.command, "Sending frame");
    sink.send(WsMessage::Text(frame.encode().into())).await?;
    Ok(())
}

fn is_history_answer(frame: &Frame, user_id: UserId) -> bool {
    frame.command == Command::Message && channel_of(frame, user_id) == Some(Channel::History)
}

async fn run_session(
    config: RealtimeConfig,
    mut cmd_rx: mpsc::Receiver<RealtimeCommand>,
    notif_tx: mpsc::Sender<RealtimeNotification>,
) {
    let user_id = config.user_id;

    let stream = match open_stomp_session(
        &config.url,
        user_id,
        &config.credential,
        config.connect_timeout,
    )
    .await
    {
        Ok(stream) => stream,
        Err(e) => {
            warn!(url = %config.url, error = %e, "Realtime handshake failed");
            let _ = notif_tx.send(RealtimeNotification::Failed(e.to_string())).await;
            return;
        }
    };

    let (mut sink, mut source) = stream.split();

    for channel in [Channel::Messages, Channel::History] {
        if let Err(e) = send_frame(&mut sink, &subscribe_frame(channel, user_id)).await {
            warn!(error = %e, "Subscribe failed");
            let _ = notif_tx.send(RealtimeNotification::Failed(e.to_string())).await;
            return;
        }
    }

    info!(user = %user_id, "Realtime session connected");
    if notif_tx.send(RealtimeNotification::Connected).await.is_err() {
        return;
    }

    let outcome: Result<()> = loop {
        tokio::select! {
            // --- Commands from the client ---
            cmd = cmd_rx.recv() => {
                let result = match cmd {
                    Some(RealtimeCommand::Send(message)) => {
                        match send_message_frame(&message) {
                            Ok(frame) => send_frame(&mut sink, &frame).await,
                            Err(e) => Err(e),
                        }
                    }
                    Some(RealtimeCommand::RequestHistory(chat_id)) => {
                        match history_request_frame(&HistoryRequest { chat_id }) {
                            Ok(frame) => send_frame(&mut sink, &frame).await,
                            Err(e) => Err(e),
                        }
                    }
                    Some(RealtimeCommand::Shutdown) | None => break Ok(()),
                };
                if let Err(e) = result {
                    break Err(e);
                }
            }

            // --- Frames from the broker ---
            incoming = source.next() => {
                let notification = match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match Frame::decode(text.as_str()) {
                            Ok(Some(frame)) => match decode_inbound(&frame, user_id) {
                                Ok(Some(Inbound::Message(m))) => {
                                    Some(RealtimeNotification::MessageReceived(m))
                                }
                                Ok(Some(Inbound::History(items))) => {
                                    Some(RealtimeNotification::HistoryReceived(items))
                                }
                                Ok(None) if is_history_answer(&frame, user_id) => {
                                    Some(RealtimeNotification::HistoryDropped)
                                }
                                Ok(None) => None,
                                Err(e) => break Err(e),
                            },
                            Ok(None) => None,
                            Err(e) => break Err(NetError::Frame(e)),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break Err(NetError::Closed),
                    Some(Ok(_)) => None,
                    Some(Err(e)) => break Err(e.into()),
                };
                if let Some(notification) = notification {
                    if notif_tx.send(notification).await.is_err() {
                        debug!("Notification receiver dropped, closing session");
                        break Ok(());
                    }
                }
            }
        }
    };

    match outcome {
        Ok(()) => {
            for channel in [Channel::Messages, Channel::History] {
                let _ = send_frame(&mut sink, &unsubscribe_frame(channel)).await;
            }
            let _ = send_frame(&mut sink, &Frame::new(Command::Disconnect)).await;
            let _ = sink.close().await;
            info!(user = %user_id, "Realtime session closed");
            let _ = notif_tx.send(RealtimeNotification::Closed).await;
        }
        Err(e) => {
            warn!(user = %user_id, error = %e, "Realtime session failed");
            let _ = notif_tx.send(RealtimeNotification::Failed(e.to_string())).await;
        }
    }
}
