//! Error types for the subscription manager

use thiserror::Error;

/// Errors raised at the provider adapter boundary
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation needs a live transport
    #[error("Provider {provider} is not connected")]
    NotConnected {
        /// Identifier of the provider that rejected the call
        provider: String,
    },

    /// Transport failed after it was opened
    #[error("Transport error: {0}")]
    Transport(String),

    /// Venue frame or request could not be (de)serialized
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Writer task is gone
    #[error("Outbound channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Manager level errors
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// `start` was called while a loop is already running
    #[error("Subscription manager is already running")]
    AlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },
}

/// Result alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result alias for manager operations
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
