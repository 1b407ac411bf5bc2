use thiserror::Error;

/// Main error type for the daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Startup errors
    #[error("Cryptographic session unavailable")]
    SessionUnavailable,

    #[error("Consumer subscription failed for topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    // Broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Consumer closed")]
    ConsumerClosed,

    #[error("Response pool is shut down")]
    PoolClosed,

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DaemonError
pub type Result<T> = std::result::Result<T, DaemonError>;
