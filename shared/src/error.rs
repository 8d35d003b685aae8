/*!
Common error types for the bridge components.
*/

use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Error type for all shared operations
#[derive(Error, Debug)]
pub enum SharedError {
    /// Frame failed length, sentinel or terminator checks
    #[error("Invalid {codec} frame: {reason}")]
    InvalidFrame { codec: &'static str, reason: String },

    /// Byte channel failure (read or write on the underlying link)
    #[error("Channel error: {0}")]
    Channel(String),

    /// I/O errors from the underlying link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SharedError {
    /// Create a new invalid frame error
    pub fn invalid_frame(codec: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            codec,
            reason: reason.into(),
        }
    }

    /// Create a new channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
