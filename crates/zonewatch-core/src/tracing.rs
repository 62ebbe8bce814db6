//! Logging setup and segment prefixes for zonewatch.
//!
//! Third-party crates log at `warn`; the zonewatch crates log at the level
//! requested on the command line. `RUST_LOG` replaces both when set.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATES: [&str; 2] = ["zonewatch_core", "zonewatch"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for krate in CRATES {
        directives.push_str(&format!(",{krate}={level}"));
    }
    directives
}

/// Install the global subscriber: env filter plus compact terminal output.
///
/// Fails if a subscriber is already installed.
pub fn init(level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .try_init()
}

/// Segment prefixes for logging.
pub mod prefix {
    /// Graph assembly
    pub const BUILD: &str = "⊞";
    /// Pipeline entering its playing state
    pub const PLAY_OPEN: &str = "▶";
    /// Pipeline teardown
    pub const PLAY_CLOSE: &str = "■";
    /// Zone violations raised on the dataflow path
    pub const ALARM: &str = "⚠";
}
