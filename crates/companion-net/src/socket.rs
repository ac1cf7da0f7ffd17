//! WebSocket connection setup and the STOMP handshake.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use companion_shared::constants::STOMP_VERSION;
use companion_shared::stomp::{Command, Frame};
use companion_shared::types::UserId;

use crate::error::{NetError, Result};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Append the credential to the realtime endpoint as a `token` query parameter.
pub fn session_url(base: &str, credential: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(base).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", credential);
    Ok(url.into())
}

/// Host part of a URL, used for the STOMP `host` header.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

pub fn connect_frame(url: &str, user_id: UserId, credential: &str) -> Frame {
    Frame::new(Command::Connect)
        .header("accept-version", STOMP_VERSION)
        .header("host", host_of(url))
        .header("login", user_id.to_string())
        .header("Authorization", format!("Bearer {credential}"))
        .header("heart-beat", "0,0")
}

/// Open the socket and complete the STOMP handshake within `timeout`.
pub async fn open_stomp_session(
    url: &str,
    user_id: UserId,
    credential: &str,
    timeout: Duration,
) -> Result<WsStream> {
    tokio::time::timeout(timeout, handshake(url, user_id, credential))
        .await
        .map_err(|_| NetError::HandshakeTimeout(timeout.as_secs()))?
}

async fn handshake(url: &str, user_id: UserId, credential: &str) -> Result<WsStream> {
    let (mut stream, _response) = connect_async(session_url(url, credential)?).await?;
    let connect = connect_frame(url, user_id, credential);
    stream.send(WsMessage::Text(connect.encode().into())).await?;

    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => match Frame::decode(text.as_str())? {
                Some(frame) if frame.command == Command::Connected => {
                    debug!(
                        version = frame.get("version").unwrap_or("unknown"),
                        "STOMP session established"
                    );
                    return Ok(stream);
                }
                Some(frame) if frame.command == Command::Error => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str());
                    return Err(NetError::Broker(reason.to_string()));
                }
                Some(frame) => {
                    debug!(command = %frame.command, "Ignoring frame before CONNECTED");
                }
                None => {}
            },
            WsMessage::Close(_) => return Err(NetError::Closed),
            _ => {}
        }
    }
    Err(NetError::Closed)
}
