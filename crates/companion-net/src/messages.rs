use tracing::{debug, warn};

use companion_shared::constants::{
    history_topic, messages_topic, DEST_REQUEST_HISTORY, DEST_SEND_MESSAGE, SUB_HISTORY_ID,
    SUB_MESSAGES_ID,
};
use companion_shared::protocol::{HistoryRequest, Inbound, OutgoingMessage};
use companion_shared::stomp::{Command, Frame};
use companion_shared::types::UserId;

use crate::error::{NetError, Result};

/// Which inbound subscription a MESSAGE frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Messages,
    History,
}

pub fn subscribe_frame(channel: Channel, user_id: UserId) -> Frame {
    let (id, destination) = match channel {
        Channel::Messages => (SUB_MESSAGES_ID, messages_topic(user_id.0)),
        Channel::History => (SUB_HISTORY_ID, history_topic(user_id.0)),
    };
    debug!(destination = %destination, "Subscribing to queue");
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

pub fn unsubscribe_frame(channel: Channel) -> Frame {
    let id = match channel {
        Channel::Messages => SUB_MESSAGES_ID,
        Channel::History => SUB_HISTORY_ID,
    };
    Frame::new(Command::Unsubscribe).header("id", id)
}

fn json_send_frame(destination: &str, body: String) -> Frame {
    Frame::new(Command::Send)
        .header("destination", destination)
        .header("content-type", "application/json")
        .body(body)
}

pub fn send_message_frame(message: &OutgoingMessage) -> Result<Frame> {
    Ok(json_send_frame(DEST_SEND_MESSAGE, message.to_json()?))
}

pub fn history_request_frame(request: &HistoryRequest) -> Result<Frame> {
    Ok(json_send_frame(DEST_REQUEST_HISTORY, request.to_json()?))
}

/// Route a MESSAGE frame to its subscription, by `subscription` header
/// first and by `destination` otherwise.
pub fn channel_of(frame: &Frame, user_id: UserId) -> Option<Channel> {
    match frame.get("subscription") {
        Some(SUB_MESSAGES_ID) => return Some(Channel::Messages),
        Some(SUB_HISTORY_ID) => return Some(Channel::History),
        _ => {}
    }
    let destination = frame.get("destination")?;
    if destination == messages_topic(user_id.0) {
        Some(Channel::Messages)
    } else if destination == history_topic(user_id.0) {
        Some(Channel::History)
    } else {
        None
    }
}

/// Interpret one inbound frame.
///
/// Returns `Ok(None)` for frames that carry nothing for the application,
/// including message bodies that fail to parse, and an error for frames
/// that end the session.
pub fn decode_inbound(frame: &Frame, user_id: UserId) -> Result<Option<Inbound>> {
    match frame.command {
        Command::Message => {
            let Some(channel) = channel_of(frame, user_id) else {
                debug!(
                    destination = frame.get("destination").unwrap_or_default(),
                    "MESSAGE on unknown subscription"
                );
                return Ok(None);
            };
            let parsed = match channel {
                Channel::Messages => Inbound::message_from_json(&frame.body),
                Channel::History => Inbound::history_from_json(&frame.body),
            };
            match parsed {
                Ok(inbound) => Ok(Some(inbound)),
                Err(e) => {
                    warn!(channel = ?channel, error = %e, "Dropping unparseable message body");
                    Ok(None)
                }
            }
        }
        Command::Error => {
            let reason = frame.get("message").unwrap_or(frame.body.as_str());
            Err(NetError::Broker(reason.to_string()))
        }
        other => {
            debug!(command = %other, "Ignoring frame");
            Ok(None)
        }
    }
}
