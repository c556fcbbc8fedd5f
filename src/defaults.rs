//! Default configuration constants for dictapi.
//!
//! Shared between the timeline model, the transport and the configuration
//! types so the values stay consistent.

/// Time window (milliseconds) within which an offset is snapped to a slice
/// edge or an existing marker instead of creating a near-zero-length piece.
pub const LATCH_TOLERANCE_MS: u64 = 200;

/// Playback speed of a fresh session (forward, normal rate).
pub const DEFAULT_SPEED: f64 = 1.0;

/// Smallest accepted speed magnitude.
pub const MIN_SPEED: f64 = 0.01;

/// Largest accepted speed magnitude.
pub const MAX_SPEED: f64 = 100.0;

/// Directory new recordings are written to.
pub const AUDIO_DIR: &str = ".";

/// Container/codec extension of new recordings.
pub const FILE_FORMAT: &str = "mp3";

/// Infix inserted before the extension of a reverse-encoded asset.
pub const REVERSE_INFIX: &str = "reverse";

/// Interval between checks for a just-finalized recording file.
pub const FINALIZE_POLL_MS: u64 = 100;

/// How long to wait for the player to answer a query.
pub const PLAYER_REPLY_TIMEOUT_MS: u64 = 2000;

/// Recorder program (from the SoX suite).
pub const RECORDER_PROGRAM: &str = "rec";

/// Player program, driven in slave mode.
pub const PLAYER_PROGRAM: &str = "mplayer";

/// Extra player arguments placed before the per-segment ones.
pub const PLAYER_ARGS: &[&str] = &["-slave", "-quiet", "-af", "scaletempo"];

/// Duration probe program (from the SoX suite).
pub const PROBER_PROGRAM: &str = "soxi";

/// Encoder program used to produce reverse renditions.
pub const ENCODER_PROGRAM: &str = "sox";
