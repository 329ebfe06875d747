//! Logging and gateway events
//!
//! - `init_tracing` - process-wide `tracing` subscriber
//! - `Event` / `EventReporter` - numbered gateway events
//! - `file` - rotating event log written off the gateway task

pub mod event;
pub mod file;

pub use event::{Event, EventId, EventReporter, Severity};
pub use file::{spawn_event_log, EventLogConfig};

/// Initialize tracing for gateway output
///
/// Call early in main() before any logging occurs.
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}
