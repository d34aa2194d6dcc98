use thiserror::Error;

/// Main error type for the clip-bridge library
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while binding a session to a script's output clip.
///
/// All of these are fatal for the session being constructed: nothing is
/// retained, and the caller has to construct a new one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to initialize script engine: {reason}")]
    EngineInit { reason: String },

    #[error("Failed to evaluate {path}{}", detail(.message))]
    ScriptEvaluation {
        path: String,
        message: Option<String>,
    },

    #[error("Failed to retrieve output node")]
    NoOutput,

    #[error("Cannot output clips with varying dimensions or unknown length")]
    UnsupportedClip,
}

fn detail(message: &Option<String>) -> String {
    message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default()
}

/// Errors local to a single frame request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Encountered error getting frame {frame}: {message}")]
    Decode { frame: i32, message: String },

    #[error("Buffer too small for frame {frame}: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        frame: i32,
        needed: usize,
        actual: usize,
    },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to build frame worker pool: {reason}")]
    PoolBuildFailed { reason: String },

    #[error("No async runtime to deliver completions on: {reason}")]
    NoRuntime { reason: String },

    #[error("Frame {frame} was dropped by the worker pool before completing")]
    JobLost { frame: i32 },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // IO errors might be temporary
            Self::Io(_) => true,
            // A failed frame never poisons the session; resubmitting is allowed
            Self::Frame(_) => true,
            // Construction-time failures require a new session
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Session(SessionError::ScriptEvaluation { path, .. }) => {
                format!("Could not evaluate script '{}'. Check the script and its working directory.", path)
            }
            Self::Session(SessionError::UnsupportedClip) => {
                "The script's output clip must have a constant format and a known, nonzero length.".to_string()
            }
            Self::Frame(FrameError::BufferTooSmall { needed, .. }) => {
                format!("Frame buffers must hold at least {} bytes (see frame_size).", needed)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_evaluation_message_includes_path() {
        let err = SessionError::ScriptEvaluation {
            path: "/scripts/clip.vpy".to_string(),
            message: Some("syntax error".to_string()),
        };
        assert_eq!(err.to_string(), "Failed to evaluate /scripts/clip.vpy: syntax error");

        let bare = SessionError::ScriptEvaluation {
            path: "/scripts/clip.vpy".to_string(),
            message: None,
        };
        assert_eq!(bare.to_string(), "Failed to evaluate /scripts/clip.vpy");
    }

    #[test]
    fn test_decode_error_names_frame() {
        let err = FrameError::Decode {
            frame: 12,
            message: "out of range".to_string(),
        };
        assert_eq!(err.to_string(), "Encountered error getting frame 12: out of range");
    }

    #[test]
    fn test_recoverability() {
        let frame: BridgeError = FrameError::Decode {
            frame: 0,
            message: String::new(),
        }
        .into();
        assert!(frame.is_recoverable());

        let session: BridgeError = SessionError::NoOutput.into();
        assert!(!session.is_recoverable());
    }
}
