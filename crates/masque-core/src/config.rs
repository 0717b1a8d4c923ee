//! Configuration management for Masque.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Configuration is validated once at load
//! time; the detection pipeline trusts the values it is handed.

use crate::error::{ConfigError, ConfigResult};
use crate::types::EntityType;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_NER_ENDPOINT: &str = "http://localhost:8765";
const DEFAULT_NER_MODELS: [&str; 2] = ["xx_ent_wiki_sm", "en_core_web_sm"];

/// Main anonymizer configuration.
///
/// This is loaded from `~/.config/masque/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct AnonymizerConfig {
    /// Keep a per-session placeholder mapping and restore responses
    pub reversible_chat: bool,
    /// Anonymize ingested documents before they are stored
    pub anonymize_rabbit_hole: bool,
    /// Learn allowed entities from ingested documents and suppress them
    pub enable_allowedlist: bool,
    /// Comma-separated `domain[/path]` prefixes whose documents are never anonymized
    pub allowed_websites: String,
    /// Detect email addresses
    pub anonymize_email: bool,
    /// Detect phone numbers
    pub anonymize_phone: bool,
    /// Detect fiscal codes
    pub anonymize_fiscal_code: bool,
    /// Detect person names
    pub anonymize_names: bool,
    /// Detect locations
    pub anonymize_locations: bool,
    /// Detect organizations
    pub anonymize_organizations: bool,
    /// Minimum NER confidence, in `[0, 1]`
    pub confidence_threshold: f64,
    /// Per-category overrides of `confidence_threshold`
    pub category_thresholds: CategoryThresholds,
    /// Location of the allowlist database
    pub sqlite_db_path: PathBuf,
    /// One-shot trigger: wipe the allowlist, then clear this flag
    pub reset_db: bool,
    /// Verbose anonymization logs (includes entity text)
    pub debug_logging: bool,
    /// NER backend settings
    pub ner: NerConfig,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        Self {
            reversible_chat: true,
            anonymize_rabbit_hole: false,
            enable_allowedlist: true,
            allowed_websites: String::new(),
            anonymize_email: true,
            anonymize_phone: true,
            anonymize_fiscal_code: true,
            anonymize_names: true,
            anonymize_locations: true,
            anonymize_organizations: true,
            confidence_threshold: 0.5,
            category_thresholds: CategoryThresholds::default(),
            sqlite_db_path: Self::default_db_path(),
            reset_db: false,
            debug_logging: false,
            ner: NerConfig::default(),
        }
    }
}

impl AnonymizerConfig {
    /// Load configuration from the default location, falling back to defaults
    /// if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    /// - A value fails validation
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let config: Self = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            tracing::debug!("Config file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `MASQUE_DB_PATH`: Override the allowlist database path
    /// - `MASQUE_DEBUG_LOGGING`: Override debug logging (true/false)
    /// - `MASQUE_CONFIDENCE_THRESHOLD`: Override the NER confidence threshold
    /// - `MASQUE_NER_ENDPOINT`: Override the NER sidecar URL
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `MASQUE_*` environment overrides in place.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MASQUE_DB_PATH") {
            tracing::debug!("Override sqlite_db_path from env: {}", val);
            self.sqlite_db_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MASQUE_DEBUG_LOGGING") {
            if let Ok(enabled) = val.parse() {
                self.debug_logging = enabled;
                tracing::debug!("Override debug_logging from env: {}", enabled);
            }
        }

        if let Ok(val) = std::env::var("MASQUE_CONFIDENCE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.confidence_threshold = threshold;
                tracing::debug!("Override confidence_threshold from env: {}", threshold);
            }
        }

        if let Ok(val) = std::env::var("MASQUE_NER_ENDPOINT") {
            tracing::debug!("Override ner.endpoint from env: {}", val);
            self.ner.endpoint = val;
        }
    }

    /// Validate every constrained field.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        check_threshold("confidence_threshold", self.confidence_threshold)?;
        for (entity_type, threshold) in self.category_thresholds.overrides() {
            check_threshold(
                &format!("category_thresholds.{}", entity_type.as_str().to_lowercase()),
                threshold,
            )?;
        }

        if self.needs_statistical_detection() && self.ner.models.is_empty() {
            return Err(ConfigError::invalid(
                "ner.models",
                "at least one model is required while name, location or organization detection is enabled",
            ));
        }

        if self.ner.acquire_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "ner.acquire_timeout_secs",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Save configuration to the default location.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path
            .parent()
            .ok_or_else(|| ConfigError::invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Clear a consumed `reset_db` flag in the file at `path`.
    ///
    /// The stored file is reloaded and only the flag changes, so environment
    /// overrides and command-line switches of the running configuration are
    /// never written back. Returns whether the file was rewritten.
    pub fn clear_reset_flag(path: &Path) -> ConfigResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let mut stored = Self::load_from(path)?;
        if !stored.reset_db {
            return Ok(false);
        }
        stored.reset_db = false;
        stored.save_to(path)?;
        Ok(true)
    }

    /// Whether detection of a category is switched on.
    #[must_use]
    pub fn category_enabled(&self, entity_type: EntityType) -> bool {
        match entity_type {
            EntityType::Email => self.anonymize_email,
            EntityType::Phone => self.anonymize_phone,
            EntityType::FiscalCode => self.anonymize_fiscal_code,
            EntityType::Person => self.anonymize_names,
            EntityType::Organization => self.anonymize_organizations,
            EntityType::Location => self.anonymize_locations,
        }
    }

    /// Effective confidence threshold for a category.
    #[must_use]
    pub fn threshold_for(&self, entity_type: EntityType) -> f64 {
        self.category_thresholds
            .get(entity_type)
            .unwrap_or(self.confidence_threshold)
    }

    /// Whether any NER-backed category is enabled.
    #[must_use]
    pub fn needs_statistical_detection(&self) -> bool {
        self.anonymize_names || self.anonymize_locations || self.anonymize_organizations
    }

    /// The `allowed_websites` entries, trimmed, empties removed.
    #[must_use]
    pub fn allowed_website_entries(&self) -> Vec<&str> {
        self.allowed_websites
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect()
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/masque/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = project_dirs().ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/masque`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = project_dirs().ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    fn default_db_path() -> PathBuf {
        Self::data_dir()
            .unwrap_or_default()
            .join("allowedlist.db")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "masque", "masque")
}

fn check_threshold(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

/// Optional per-category confidence thresholds for NER categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryThresholds {
    /// Threshold for PERSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<f64>,
    /// Threshold for ORGANIZATION
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<f64>,
    /// Threshold for LOCATION
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<f64>,
}

impl CategoryThresholds {
    /// Override for a category, if one is set.
    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> Option<f64> {
        match entity_type {
            EntityType::Person => self.person,
            EntityType::Organization => self.organization,
            EntityType::Location => self.location,
            EntityType::Email | EntityType::Phone | EntityType::FiscalCode => None,
        }
    }

    fn overrides(&self) -> impl Iterator<Item = (EntityType, f64)> + '_ {
        [
            EntityType::Person,
            EntityType::Organization,
            EntityType::Location,
        ]
        .into_iter()
        .filter_map(|t| self.get(t).map(|v| (t, v)))
    }
}

/// NER backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    /// Base URL of the NER sidecar
    pub endpoint: String,
    /// Models to try, in order of preference
    pub models: Vec<String>,
    /// Upper bound on loading or downloading one model, in seconds
    pub acquire_timeout_secs: u64,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_NER_ENDPOINT.to_string(),
            models: DEFAULT_NER_MODELS.iter().map(ToString::to_string).collect(),
            acquire_timeout_secs: 300,
        }
    }
}
