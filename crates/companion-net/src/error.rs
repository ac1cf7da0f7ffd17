use thiserror::Error;

use companion_shared::FrameError;

/// Errors produced by the REST client and the realtime connection.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{method} {path} returned {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("Unparseable payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid STOMP frame received.
    #[error("STOMP frame error: {0}")]
    Frame(#[from] FrameError),

    /// The broker rejected the session or reported an error frame.
    #[error("Broker error: {0}")]
    Broker(String),

    /// The realtime endpoint is not a valid URL.
    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),

    /// The handshake did not complete in time.
    #[error("Handshake timed out after {0} seconds")]
    HandshakeTimeout(u64),

    /// The socket closed before or during the session.
    #[error("Connection closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
