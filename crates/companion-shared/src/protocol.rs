use serde::{Deserialize, Serialize};

use crate::types::{ChatId, Message, UserId};

/// Body published to the send-message destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
}

/// Body published to the history destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub chat_id: ChatId,
}

/// Body of `POST /chats/get-or-create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPairRequest {
    #[serde(rename = "userAId")]
    pub user_a_id: UserId,
    #[serde(rename = "userBId")]
    pub user_b_id: UserId,
}

/// Payloads delivered on the two inbound subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One message pushed on the direct-delivery queue
    Message(Message),
    /// A full history answer on the history queue
    History(Vec<Message>),
}

impl Inbound {
    pub fn message_from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body).map(Self::Message)
    }

    /// History answers are a JSON array; a single object is accepted as a
    /// one-element history.
    pub fn history_from_json(body: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Vec<Message>>(body) {
            Ok(messages) => Ok(Self::History(messages)),
            Err(e) => match serde_json::from_str::<Message>(body) {
                Ok(message) => Ok(Self::History(vec![message])),
                Err(_) => Err(e),
            },
        }
    }
}

impl OutgoingMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl HistoryRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_message_shape() {
        let body = OutgoingMessage {
            chat_id: ChatId(4),
            sender_id: UserId(3),
            content: "hello".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(body, r#"{"chatId":4,"senderId":3,"content":"hello"}"#);
    }

    #[test]
    fn test_pair_request_shape() {
        let body = serde_json::to_string(&ChatPairRequest {
            user_a_id: UserId(3),
            user_b_id: UserId(1),
        })
        .unwrap();
        assert_eq!(body, r#"{"userAId":3,"userBId":1}"#);
    }

    #[test]
    fn test_history_accepts_array_or_object() {
        let array = r#"[{"chatId":1,"senderId":3,"content":"a","sentAt":"2024-05-01T10:00:00Z"}]"#;
        let single = r#"{"chatId":1,"senderId":3,"content":"a","sentAt":"2024-05-01T10:00:00Z"}"#;
        let Inbound::History(from_array) = Inbound::history_from_json(array).unwrap() else {
            panic!("expected history");
        };
        let Inbound::History(from_single) = Inbound::history_from_json(single).unwrap() else {
            panic!("expected history");
        };
        assert_eq!(from_array, from_single);
        assert!(Inbound::history_from_json("not json").is_err());
    }
}
