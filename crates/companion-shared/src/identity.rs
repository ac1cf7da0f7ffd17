//! Identity resolution from a bearer credential.
//!
//! The credential is a JWT issued by the backend. Only its payload is read
//! here; signature validation belongs to the backend, which remains the
//! authority on every request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CredentialError;
use crate::types::{Identity, RoleSet, UserId};

impl Identity {
    /// Decode the caller's identity from a credential, reporting why it failed.
    pub fn from_credential(credential: &str) -> Result<Self, CredentialError> {
        let token = credential.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }

        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CredentialError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let claims: Map<String, Value> = match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => map,
            _ => return Err(CredentialError::Payload),
        };

        let id = claim_id(&claims).ok_or(CredentialError::MissingClaim("id"))?;
        let roles = claims
            .get("roles")
            .or_else(|| claims.get("role"))
            .map(RoleSet::from_value)
            .unwrap_or_default();

        Ok(Self {
            id,
            first_name: claim_str(&claims, "firstName"),
            surname: claim_str(&claims, "surname"),
            roles,
        })
    }
}

/// Resolve a credential to an identity, or `None` when it is missing or malformed.
pub fn decode(credential: &str) -> Option<Identity> {
    match Identity::from_credential(credential) {
        Ok(identity) => Some(identity),
        Err(e) => {
            debug!(error = %e, "Credential did not resolve to an identity");
            None
        }
    }
}

fn claim_id(claims: &Map<String, Value>) -> Option<UserId> {
    ["id", "userId", "sub"]
        .iter()
        .filter_map(|key| claims.get(*key))
        .find_map(as_integer)
        .map(UserId)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn claim_str(claims: &Map<String, Value>, key: &str) -> String {
    claims
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
