//! Chat client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a session can start with zero
//! configuration against a local backend.

use std::time::Duration;

use companion_shared::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HISTORY_TIMEOUT_SECS,
    DEFAULT_MOCK_REPLY_DELAY_MS, DEFAULT_REALTIME_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SUPPORT_ADMIN_ID,
};
use companion_shared::types::UserId;

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// REST backend base URL.
    /// Env: `API_BASE_URL`
    /// Default: `http://localhost:8080/api`
    pub api_base_url: String,

    /// Realtime (STOMP over WebSocket) endpoint.
    /// Env: `REALTIME_URL`
    /// Default: `ws://localhost:8080/ws`
    pub realtime_url: String,

    /// Skip the realtime connection and start directly in degraded-mock mode.
    /// Env: `FORCE_MOCK` (true/false)
    /// Default: `false`
    pub force_mock: bool,

    /// Delay before the simulated admin reply in mock mode.
    /// Env: `MOCK_REPLY_DELAY_MS`
    pub mock_reply_delay: Duration,

    /// Text of the simulated admin reply.
    pub mock_reply_text: String,

    /// Realtime handshake timeout.
    /// Env: `CONNECT_TIMEOUT_SECS`
    pub connect_timeout: Duration,

    /// How long a history request may stay unanswered before the next one goes out.
    /// Env: `HISTORY_TIMEOUT_SECS`
    pub history_timeout: Duration,

    /// REST request timeout.
    /// Env: `REQUEST_TIMEOUT_SECS`
    pub request_timeout: Duration,

    /// Admin preferred as support counterpart when present in the directory.
    /// Env: `SUPPORT_ADMIN_ID`
    /// Default: `1`
    pub support_admin_id: UserId,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            force_mock: false,
            mock_reply_delay: Duration::from_millis(DEFAULT_MOCK_REPLY_DELAY_MS),
            mock_reply_text: "Thanks for your message! An organizer will get back to you shortly."
                .to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            history_timeout: Duration::from_secs(DEFAULT_HISTORY_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            support_admin_id: UserId(DEFAULT_SUPPORT_ADMIN_ID),
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup; invalid values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("API_BASE_URL") {
            config.api_base_url = url;
        }

        if let Some(url) = lookup("REALTIME_URL") {
            config.realtime_url = url;
        }

        if let Some(val) = lookup("FORCE_MOCK") {
            config.force_mock = val == "true" || val == "1";
        }

        if let Some(ms) = parse_number(&lookup, "MOCK_REPLY_DELAY_MS") {
            config.mock_reply_delay = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_number(&lookup, "CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_number(&lookup, "HISTORY_TIMEOUT_SECS") {
            config.history_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_number(&lookup, "REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("SUPPORT_ADMIN_ID") {
            match val.trim().parse::<i64>() {
                Ok(id) => config.support_admin_id = UserId(id),
                Err(_) => tracing::warn!(value = %val, "Invalid SUPPORT_ADMIN_ID, using default"),
            }
        }

        config
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid numeric setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert_eq!(config.support_admin_id, UserId(1));
        assert!(!config.force_mock);
    }

    #[test]
    fn test_lookup_overrides_and_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("REALTIME_URL", "wss://chat.example.org/ws"),
            ("FORCE_MOCK", "1"),
            ("MOCK_REPLY_DELAY_MS", "250"),
            ("CONNECT_TIMEOUT_SECS", "soon"),
            ("SUPPORT_ADMIN_ID", "2"),
            ("HISTORY_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let config = ChatConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.realtime_url, "wss://chat.example.org/ws");
        assert!(config.force_mock);
        assert_eq!(config.mock_reply_delay, Duration::from_millis(250));
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(config.support_admin_id, UserId(2));
        assert_eq!(config.history_timeout, Duration::from_secs(3));
    }
}
