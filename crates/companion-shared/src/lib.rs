//! # companion-shared
//!
//! Domain types, identity resolution and the STOMP frame codec shared by the
//! companion chat crates.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod stomp;
pub mod types;

pub use error::{CredentialError, FrameError};
pub use identity::decode;
pub use types::{ChatId, Chat, ConnectionState, Identity, Message, RoleSet, UserId};
