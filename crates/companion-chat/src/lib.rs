pub mod config;
pub mod directory;
pub mod events;
pub mod policy;
pub mod seed;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ChatConfig;
pub use directory::{DirectoryCache, DirectorySource};
pub use events::{ChatEvent, EventBus};
pub use session::ChatSession;
pub use state::MessageStore;
pub use transport::{Transport, TransportEvent};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
///
/// Calling it more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("companion_chat=debug,companion_net=debug,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting companion chat client");
    }
}
