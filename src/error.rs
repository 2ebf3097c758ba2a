//! Error types for Board Warden.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

impl Error {
    /// Whether the same work could succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::Database(DatabaseError::Pool(_) | DatabaseError::Query(_)) => true,
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Card fetch errors from the card service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Card {card_id} not found")]
    NotFound { card_id: String },

    #[error("Transient fetch failure: {0}")]
    Transient(String),

    #[error("Unexpected card payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether retrying the fetch later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Outbound notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification to {sink} failed: {reason}")]
    SendFailed { sink: String, reason: String },

    #[error("Notification to {sink} rejected with status {status}")]
    Rejected { sink: String, status: u16 },
}

/// Errors from the webhook registration surface.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("{0}")]
    Validation(String),

    #[error("Webhook registration failed: {0}")]
    Registration(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
