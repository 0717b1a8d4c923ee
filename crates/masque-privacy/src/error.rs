use thiserror::Error;

/// Error types for anonymization operations.
#[derive(Debug, Error)]
pub enum PrivacyError {
    /// Configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] masque_core::ConfigError),

    /// Detection backend failed.
    #[error("Detection error: {0}")]
    Detection(#[from] masque_detect::DetectError),

    /// Allowlist store failed.
    #[error("Allowlist error: {0}")]
    Store(#[from] masque_db::DatabaseError),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for anonymization operations.
pub type Result<T> = std::result::Result<T, PrivacyError>;
