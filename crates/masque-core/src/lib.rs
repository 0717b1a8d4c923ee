//! Masque Core - Foundation crate for the Masque anonymizer.
//!
//! This crate provides the shared types, error handling and configuration
//! management that all other Masque crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and validation
//! - [`types`] - Shared domain types (`EntityType`, `Span`)
//!
//! # Example
//!
//! ```rust
//! use masque_core::{AnonymizerConfig, EntityType};
//!
//! let config = AnonymizerConfig::default();
//! config.validate().expect("defaults are valid");
//! assert!(config.category_enabled(EntityType::Email));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AnonymizerConfig, CategoryThresholds, NerConfig};
pub use error::{ConfigError, ConfigResult, MasqueError, Result};
pub use types::{EntityType, Span};
