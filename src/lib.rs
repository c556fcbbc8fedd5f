//! dictapi - Dictaphone control backend
//!
//! Keeps a spliced timeline of recordings and drives external recorder and
//! player processes through a transport state machine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod config;
pub mod defaults;
pub mod error;
pub mod media;
pub mod timeline;
pub mod transport;

// Timeline
pub use timeline::{Millis, Position, Timeline};

// Transport
pub use command::{Command, parse_line};
pub use transport::{
    CommandLog, PlaybackEvent, SeekTarget, Session, SpeedChange, StateKind, TransportSettings,
};

// External tools
pub use media::{MediaTools, PlayerLauncher, Prober, Recorder};

// Error handling
pub use error::{DictapiError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_in_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "unexpected hash in {ver}");
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
