//! Built-in seed data, used when the backend is unreachable or returns
//! unparseable payloads. Fixed and deterministic.

use chrono::{DateTime, Utc};

use companion_shared::types::{Chat, ChatId, Identity, Message, RoleSet, UserId};

/// 2024-09-02T09:00:00Z
const SEED_EPOCH: i64 = 1_725_267_600;

fn at(offset_secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(SEED_EPOCH + offset_secs, 0).unwrap_or_default()
}

pub fn seed_users() -> Vec<Identity> {
    vec![
        Identity::new(1, "Anna", "Organizer", RoleSet::admin()),
        Identity::new(2, "Marco", "Support", RoleSet::admin()),
        Identity::new(3, "Lena", "Student", RoleSet::new(["user"])),
        Identity::new(4, "Tom", "Student", RoleSet::new(["user"])),
    ]
}

pub fn seed_chats() -> Vec<Chat> {
    vec![
        Chat {
            id: ChatId(1),
            participant_a: UserId(3),
            participant_b: UserId(1),
            created_at: at(0),
        },
        Chat {
            id: ChatId(2),
            participant_a: UserId(4),
            participant_b: UserId(2),
            created_at: at(600),
        },
    ]
}

/// One organizer greeting per seed chat.
pub fn seed_messages() -> Vec<Message> {
    vec![
        Message {
            chat_id: ChatId(1),
            sender_id: UserId(1),
            content: "Hi Lena, welcome! Let us know if you need anything during the event."
                .to_string(),
            sent_at: at(60),
        },
        Message {
            chat_id: ChatId(2),
            sender_id: UserId(2),
            content: "Hi Tom, the help desk is next to the main entrance.".to_string(),
            sent_at: at(660),
        },
    ]
}
