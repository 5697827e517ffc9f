use thiserror::Error;

/// Main error type for the warden service
#[derive(Error, Debug)]
pub enum WardenError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Game API errors
    #[error("Game API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("No usable credential for {entity}")]
    MissingCredential { entity: String },

    // Poll coordination errors
    #[error("Job {job} already running, retry in {retry_after_secs}s")]
    AlreadyRunning { job: String, retry_after_secs: u64 },

    // Notification delivery errors
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Errors the scheduler may simply retry at the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WardenError::AlreadyRunning { .. })
    }
}

/// Result type alias for WardenError
pub type Result<T> = std::result::Result<T, WardenError>;
