use thiserror::Error;

/// Main error type for the realtime channel
#[derive(Error, Debug)]
pub enum ChannelError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Write attempted on a transport that is no longer open
    #[error("Transport closed")]
    TransportClosed,

    /// Frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Error returned by an inbound event handler
    #[error("Handler error: {0}")]
    Handler(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Shorthand used by handlers that want to fail with a message
    pub fn handler(message: impl Into<String>) -> Self {
        ChannelError::Handler(message.into())
    }
}

/// Result type for realtime channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
