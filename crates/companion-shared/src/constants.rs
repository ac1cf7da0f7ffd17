/// STOMP protocol version negotiated on CONNECT
pub const STOMP_VERSION: &str = "1.2";

/// Subscription id for direct message delivery
pub const SUB_MESSAGES_ID: &str = "sub-messages";

/// Subscription id for history-on-demand delivery
pub const SUB_HISTORY_ID: &str = "sub-history";

/// Publish destination for outgoing chat messages
pub const DEST_SEND_MESSAGE: &str = "/app/chat.send";

/// Publish destination for history requests
pub const DEST_REQUEST_HISTORY: &str = "/app/chat.history";

/// Per-user topic carrying direct message delivery
pub fn messages_topic(user_id: i64) -> String {
    format!("/user/{user_id}/queue/messages")
}

/// Per-user topic carrying history responses
pub fn history_topic(user_id: i64) -> String {
    format!("/user/{user_id}/queue/history")
}

/// Default REST backend base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Default realtime endpoint
pub const DEFAULT_REALTIME_URL: &str = "ws://localhost:8080/ws";

/// Admin targeted by support chats when present in the directory
pub const DEFAULT_SUPPORT_ADMIN_ID: i64 = 1;

/// Delay before a simulated admin reply in mock mode (milliseconds)
pub const DEFAULT_MOCK_REPLY_DELAY_MS: u64 = 1500;

/// Realtime handshake timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Time allowed for a history answer before the request is given up
pub const DEFAULT_HISTORY_TIMEOUT_SECS: u64 = 10;

/// REST request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
