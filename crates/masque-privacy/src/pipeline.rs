//! End-to-end anonymization pipeline.
//!
//! This module ties the detectors, the allowlist and the substitution engine
//! together:
//! - Pattern detection always runs
//! - NER detection runs when a name category is enabled and a model loads
//! - Both outputs are merged and overlaps resolved once more
//! - Allowlisted texts are skipped during substitution

use crate::error::Result;
use crate::mapping::PlaceholderMapping;
use crate::sources::{is_allowed_source, parse_allowed_sites, AllowedSite};
use crate::substitution;
use masque_core::{AnonymizerConfig, Span};
use masque_db::{AllowlistStore, DatabaseError};
use masque_detect::{
    resolve_overlaps, HttpNerLoader, ModelRegistry, PatternDetector, StatisticalDetector,
};
use std::sync::Arc;
use std::time::Duration;

/// Configured anonymizer.
///
/// Cheap to rebuild for a new configuration: the model registry and the
/// allowlist store are shared.
#[derive(Debug)]
pub struct Anonymizer {
    config: AnonymizerConfig,
    patterns: PatternDetector,
    allowed_sites: Vec<AllowedSite>,
    registry: Arc<ModelRegistry>,
    allowlist: Arc<AllowlistStore>,
}

impl Anonymizer {
    /// Assemble an anonymizer from its collaborators.
    #[must_use]
    pub fn new(
        config: AnonymizerConfig,
        registry: Arc<ModelRegistry>,
        allowlist: Arc<AllowlistStore>,
    ) -> Self {
        let patterns = PatternDetector::from_config(&config);
        let allowed_sites = parse_allowed_sites(config.allowed_website_entries());
        Self {
            config,
            patterns,
            allowed_sites,
            registry,
            allowlist,
        }
    }

    /// Validate `config`, connect the NER backend and open the allowlist.
    ///
    /// An allowlist that cannot be opened is logged and left uninitialized.
    ///
    /// # Errors
    /// Returns `PrivacyError::InvalidConfiguration` for an invalid
    /// configuration, or `PrivacyError::Detection` if the HTTP client cannot
    /// be built.
    pub async fn from_config(config: AnonymizerConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(build_registry(&config)?);
        let allowlist = Arc::new(AllowlistStore::open(config.sqlite_db_path.clone()).await);
        Ok(Self::new(config, registry, allowlist))
    }

    /// Same collaborators, different configuration.
    #[must_use]
    pub fn reconfigure(&self, config: AnonymizerConfig) -> Self {
        Self::new(config, Arc::clone(&self.registry), Arc::clone(&self.allowlist))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AnonymizerConfig {
        &self.config
    }

    /// Shared model registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Shared allowlist store.
    #[must_use]
    pub fn allowlist(&self) -> &Arc<AllowlistStore> {
        &self.allowlist
    }

    /// Detect every enabled entity category in `text`.
    ///
    /// Returns non-overlapping spans in text order. Never fails: without a
    /// usable NER model only pattern matches are returned.
    pub async fn detect(&self, text: &str) -> Vec<Span> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut spans = self.patterns.detect(text);
        let pattern_count = spans.len();

        if self.config.needs_statistical_detection() {
            match StatisticalDetector::from_config(&self.registry, &self.config).await {
                Ok(detector) => spans.extend(detector.detect(text).await),
                Err(e) => {
                    tracing::warn!(error = %e, "NER unavailable, continuing with pattern detection only");
                }
            }
        }

        let resolved = resolve_overlaps(spans);
        if !resolved.is_empty() {
            tracing::info!(
                total = resolved.len(),
                pattern = pattern_count,
                "Detected PII entities"
            );
        }
        if self.config.debug_logging {
            for span in &resolved {
                tracing::debug!(
                    entity_type = %span.entity_type,
                    start = span.start,
                    end = span.end,
                    text = %span.text,
                    "Detected entity"
                );
            }
        }
        resolved
    }

    /// Substitute already-detected `spans`, skipping allowlisted texts when
    /// the allowlist is enabled.
    #[must_use]
    pub fn substitute(&self, text: &str, spans: &[Span]) -> (String, PlaceholderMapping) {
        if self.config.enable_allowedlist {
            substitution::anonymize(text, spans, |t| self.allowlist.is_allowed(t))
        } else {
            substitution::anonymize(text, spans, |_| false)
        }
    }

    /// Detect and substitute in one step.
    pub async fn anonymize(&self, text: &str) -> (String, PlaceholderMapping) {
        let spans = self.detect(text).await;
        let (anonymized, mapping) = self.substitute(text, &spans);
        if self.config.debug_logging {
            tracing::debug!(
                original_len = text.len(),
                anonymized_len = anonymized.len(),
                mappings = mapping.len(),
                "Anonymization complete"
            );
        }
        (anonymized, mapping)
    }

    /// Allowlist every span as vouched for by `source`.
    ///
    /// Storage failures are logged; returns the number of spans recorded.
    pub async fn learn(&self, spans: &[Span], source: &str) -> usize {
        let mut recorded = 0;
        for span in spans {
            match self
                .allowlist
                .add_entity(&span.text, span.entity_type, source)
                .await
            {
                Ok(()) => recorded += 1,
                Err(DatabaseError::StoreUnavailable) => {
                    tracing::warn!(source, "Allowlist unavailable, not learning entities");
                    break;
                }
                Err(e) => {
                    tracing::error!(source, error = %e, "Failed to allowlist entity");
                }
            }
        }
        if recorded > 0 {
            tracing::info!(source, count = recorded, "Learned allowlisted entities");
        }
        recorded
    }

    /// Whether a document `source` is exempt from rabbit-hole anonymization.
    #[must_use]
    pub fn is_allowed_source(&self, source: &str) -> bool {
        is_allowed_source(&self.allowed_sites, source)
    }
}

/// Model registry backed by the configured NER sidecar.
///
/// # Errors
/// Returns `PrivacyError::Detection` if the HTTP client cannot be built.
pub fn build_registry(config: &AnonymizerConfig) -> Result<ModelRegistry> {
    let loader = HttpNerLoader::new(&config.ner.endpoint)?;
    Ok(ModelRegistry::new(
        Arc::new(loader),
        Duration::from_secs(config.ner.acquire_timeout_secs),
    ))
}
