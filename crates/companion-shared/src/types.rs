use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// User identity = backend-assigned integer id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    /// The following id. Saturates at `i64::MAX`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical, lowercased set of role names.
///
/// Role claims arrive as a bare string, as a record carrying a `roleName`
/// field, or as a list mixing both. All of them collapse into this set when
/// deserialized, so nothing past this type inspects the raw shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

pub const ADMIN_ROLE: &str = "admin";

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for role in roles {
            let role = role.as_ref().trim();
            if !role.is_empty() {
                set.insert(role.to_lowercase());
            }
        }
        Self(set)
    }

    pub fn admin() -> Self {
        Self::new([ADMIN_ROLE])
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(&role.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Normalize any of the accepted JSON role shapes.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut names = Vec::new();
        collect_role_names(value, &mut names);
        Self::new(names)
    }
}

fn collect_role_names(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(name)) = map.get("roleName") {
                out.push(name.clone());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_role_names(item, out);
            }
        }
        _ => {}
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// A resolved user: who the caller is, or an entry in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default, alias = "role")]
    pub roles: RoleSet,
}

impl Identity {
    pub fn new(id: i64, first_name: &str, surname: &str, roles: RoleSet) -> Self {
        Self {
            id: UserId(id),
            first_name: first_name.to_string(),
            surname: surname.to_string(),
            roles,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(ADMIN_ROLE)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname).trim().to_string()
    }
}

/// A two-party conversation. The participant pair is not canonically ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "userAId", alias = "participantA")]
    pub participant_a: UserId,
    #[serde(rename = "userBId", alias = "participantB")]
    pub participant_b: UserId,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn involves(&self, user: UserId) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// The other participant, or `None` when `user` is not in this chat.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if self.participant_a == user {
            Some(self.participant_b)
        } else if self.participant_b == user {
            Some(self.participant_a)
        } else {
            None
        }
    }

    pub fn involves_pair(&self, a: UserId, b: UserId) -> bool {
        (self.participant_a == a && self.participant_b == b)
            || (self.participant_a == b && self.participant_b == a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DegradedMock,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::DegradedMock => "degraded-mock",
        };
        f.write_str(label)
    }
}
