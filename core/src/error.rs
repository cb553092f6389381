//! Error types for the bot core

use thiserror::Error;

/// Main error type for the bot core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message parsing error: {0}")]
    MessageParse(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The peer closed the link or the socket failed after registration
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Registration error: {0}")]
    Registration(String),

}

impl Error {
    /// Whether the owning loop should reconnect after this error
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
