// Network layer: REST backend client and the STOMP-over-WebSocket realtime session.

pub mod backend;
pub mod error;
pub mod messages;
pub mod realtime;
pub mod rest;
pub mod socket;

pub use backend::ChatBackend;
pub use error::NetError;
pub use realtime::{
    spawn_realtime, RealtimeCommand, RealtimeConfig, RealtimeConnector, RealtimeLink,
    RealtimeNotification, WebSocketConnector,
};
pub use rest::RestClient;
