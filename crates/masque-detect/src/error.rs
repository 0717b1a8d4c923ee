//! Error types for the detection subsystem.

use thiserror::Error;

/// Errors that can occur while acquiring or running a detector.
#[derive(Error, Debug)]
pub enum DetectError {
    /// None of the preferred models could be obtained
    #[error("no NER model available (tried: {})", tried.join(", "))]
    ModelUnavailable {
        /// Model names attempted, in order
        tried: Vec<String>,
    },

    /// A single model failed to load or download
    #[error("failed to load model {model}: {message}")]
    ModelLoad {
        /// Model name
        model: String,
        /// Error message
        message: String,
    },

    /// The model failed while classifying text
    #[error("inference failed for model {model}: {message}")]
    Inference {
        /// Model name
        model: String,
        /// Error message
        message: String,
    },

    /// Model acquisition exceeded its time budget
    #[error("acquiring model {model} timed out after {seconds}s")]
    Timeout {
        /// Model name
        model: String,
        /// Timeout duration in seconds
        seconds: u64,
    },

    /// The NER backend endpoint is not a usable base URL
    #[error("invalid NER endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// Configured endpoint
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// Network error talking to the NER backend
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed backend response
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectError>;
