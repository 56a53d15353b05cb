//! Logging prelude.
//!
//! Progress lines meant for the user (`copied ...`, `removed ...`) are
//! printed on stdout. Everything diagnostic goes through `tracing` and ends
//! up on stderr:
//!
//! ```bash
//! RUST_LOG=debug playlist-mirror
//! RUST_LOG=playlist_mirror::sync=debug playlist-mirror player
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Defaults to INFO when `RUST_LOG` is unset or invalid.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
