//! NER-backed detection of person, organization and location names.

use crate::error::Result;
use crate::model::{ModelRegistry, NerModel, RawEntity};
use crate::resolver::resolve_overlaps;
use masque_core::{AnonymizerConfig, EntityType, Span};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Confidence assumed when a backend reports none, so thresholding never
/// rejects its output.
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Map a raw model label onto an entity type.
///
/// `GPE` covers countries, cities and states, `LOC` mountain ranges and
/// bodies of water, `FAC` buildings, airports, highways and bridges. Labels
/// outside the table are dropped.
#[must_use]
pub fn map_label(label: &str) -> Option<EntityType> {
    match label {
        "PERSON" | "PER" => Some(EntityType::Person),
        "ORG" | "ORGANIZATION" => Some(EntityType::Organization),
        "GPE" | "LOC" | "LOCATION" | "FAC" | "FACILITY" => Some(EntityType::Location),
        _ => None,
    }
}

/// Detector wrapping a shared NER model.
///
/// Only categories present in the threshold table are emitted; a candidate
/// whose confidence is strictly below its category threshold is dropped.
#[derive(Clone)]
pub struct StatisticalDetector {
    model: Arc<dyn NerModel>,
    thresholds: BTreeMap<EntityType, f64>,
}

impl std::fmt::Debug for StatisticalDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticalDetector")
            .field("model", &self.model.model_name())
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl StatisticalDetector {
    /// Build a detector around an already-loaded model.
    #[must_use]
    pub fn new(model: Arc<dyn NerModel>, thresholds: BTreeMap<EntityType, f64>) -> Self {
        Self { model, thresholds }
    }

    /// Obtain a model from the registry following the configured preference
    /// order and build a detector for the enabled NER categories.
    ///
    /// # Errors
    /// Returns `DetectError::ModelUnavailable` when no preferred model can be
    /// loaded or acquired in time.
    pub async fn from_config(registry: &ModelRegistry, config: &AnonymizerConfig) -> Result<Self> {
        let model = registry.first_available(&config.ner.models).await?;
        tracing::debug!(model = model.model_name(), "Initialized statistical detector");
        Ok(Self::new(model, category_thresholds(config)))
    }

    /// Name of the backing model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Detect named entities in `text`.
    ///
    /// Never fails: a model error is logged and treated as "nothing found".
    pub async fn detect(&self, text: &str) -> Vec<Span> {
        if text.is_empty() {
            return Vec::new();
        }

        match self.model.entities(text).await {
            Ok(raw) => resolve_overlaps(self.filter(text, raw)),
            Err(e) => {
                tracing::error!(
                    model = self.model.model_name(),
                    error = %e,
                    "Error in NER processing"
                );
                Vec::new()
            }
        }
    }

    fn filter(&self, text: &str, raw: Vec<RawEntity>) -> Vec<Span> {
        raw.into_iter()
            .filter_map(|entity| {
                let entity_type = map_label(&entity.label)?;
                let threshold = *self.thresholds.get(&entity_type)?;
                let score = entity.score.unwrap_or(DEFAULT_CONFIDENCE);
                if score < threshold {
                    return None;
                }
                let span = Span::from_source(text, entity.start, entity.end, entity_type);
                if span.is_none() {
                    tracing::warn!(
                        model = self.model.model_name(),
                        start = entity.start,
                        end = entity.end,
                        "Dropping entity with invalid offsets"
                    );
                }
                span
            })
            .collect()
    }
}

/// Enabled NER categories and their effective thresholds.
#[must_use]
pub fn category_thresholds(config: &AnonymizerConfig) -> BTreeMap<EntityType, f64> {
    EntityType::ALL
        .into_iter()
        .filter(|t| t.is_statistical() && config.category_enabled(*t))
        .map(|t| (t, config.threshold_for(t)))
        .collect()
}
