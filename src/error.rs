//! Error types for dictapi.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictapiError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Transport state errors
    #[error("Invalid operation `{operation}` for current state `{state}`")]
    InvalidOperation {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Not supported: {feature}")]
    Unsupported { feature: String },

    // Timeline geometry errors
    #[error("Invalid offset {offset}ms for slice of {duration}ms")]
    InvalidOffset { offset: u64, duration: u64 },

    #[error("Refusing degenerate split at {offset}ms of {duration}ms slice")]
    DegenerateSplit { offset: u64, duration: u64 },

    #[error("Slice is still being recorded; its duration is not known yet")]
    OpenSlice,

    #[error("No marker at {offset}ms")]
    NoMarker { offset: u64 },

    #[error("Timeline is empty")]
    EmptyTimeline,

    #[error("Nothing left to play in this direction at {timecode}ms")]
    TimelineEdge { timecode: u64 },

    #[error("No reverse rendition available for {asset}")]
    ReverseUnavailable { asset: String },

    // External process errors
    #[error("External tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("External tool failed: {message}")]
    ToolFailed { message: String },

    #[error("Process already exited: {message}")]
    ProcessGone { message: String },

    #[error("Unexpected player reply: {line:?}")]
    PlayerProtocol { line: String },

    #[error("Could not determine duration of {path}: {message}")]
    Probe { path: String, message: String },

    // Command language errors
    #[error("Cannot parse command `{line}`: {message}")]
    Parse { line: String, message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl DictapiError {
    /// True for the "operation not valid in this state" class.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, DictapiError::InvalidOperation { .. })
    }

    /// True for the "not supported (yet)" class, distinct from invalid-now.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DictapiError::Unsupported { .. })
    }

    /// True for rejected geometric arguments; the timeline is left unchanged.
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            DictapiError::InvalidOffset { .. }
                | DictapiError::DegenerateSplit { .. }
                | DictapiError::OpenSlice
                | DictapiError::NoMarker { .. }
                | DictapiError::EmptyTimeline
                | DictapiError::TimelineEdge { .. }
        )
    }

    /// True when an external process is considered gone.
    pub fn is_process_gone(&self) -> bool {
        matches!(self, DictapiError::ProcessGone { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DictapiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_operation_display() {
        let error = DictapiError::InvalidOperation {
            operation: "pause",
            state: "Stopped",
        };
        assert_eq!(
            error.to_string(),
            "Invalid operation `pause` for current state `Stopped`"
        );
    }

    #[test]
    fn test_degenerate_split_display() {
        let error = DictapiError::DegenerateSplit {
            offset: 150,
            duration: 4000,
        };
        assert_eq!(
            error.to_string(),
            "Refusing degenerate split at 150ms of 4000ms slice"
        );
    }

    #[test]
    fn test_player_protocol_display_quotes_line() {
        let error = DictapiError::PlayerProtocol {
            line: "ANS_LENGTH=3.00".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unexpected player reply: \"ANS_LENGTH=3.00\""
        );
    }

    #[test]
    fn test_error_classes_are_distinct() {
        let invalid = DictapiError::InvalidOperation {
            operation: "resume",
            state: "Playing",
        };
        let unsupported = DictapiError::Unsupported {
            feature: "delete while recording".to_string(),
        };
        let geometry = DictapiError::InvalidOffset {
            offset: 9000,
            duration: 1000,
        };
        let gone = DictapiError::ProcessGone {
            message: "broken pipe".to_string(),
        };

        assert!(invalid.is_invalid_operation() && !invalid.is_unsupported());
        assert!(unsupported.is_unsupported() && !unsupported.is_invalid_operation());
        assert!(geometry.is_geometry() && !geometry.is_process_gone());
        assert!(gone.is_process_gone() && !gone.is_geometry());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: DictapiError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<DictapiError>();
        assert_sync::<DictapiError>();
    }
}
