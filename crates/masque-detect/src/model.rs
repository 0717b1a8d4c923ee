//! NER model abstraction and the process-wide model registry.
//!
//! The named-entity model is an external capability. [`NerModel`] is the
//! classifier seam, [`ModelLoader`] is how a model is obtained (load if
//! installed, otherwise acquire on demand), and [`ModelRegistry`] memoizes
//! loaded models by name so each one is loaded at most once per process.

use crate::error::{DetectError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default time a failed model is left alone before acquisition is retried.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// An entity candidate as reported by a model.
///
/// Offsets are byte offsets into the text the model was given. They are
/// validated by the caller; a model may report garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Model-specific label (`PER`, `GPE`, `ORG`, ...)
    pub label: String,
    /// Confidence in `[0, 1]`, when the backend provides one
    pub score: Option<f64>,
}

/// A loaded named-entity recognition model.
///
/// Implementations must be thread-safe; one instance is shared by every
/// session.
#[async_trait]
pub trait NerModel: Send + Sync {
    /// Classify `text` and return entity candidates.
    ///
    /// # Errors
    /// Returns error if the model crashes or produces output that cannot be
    /// interpreted.
    async fn entities(&self, text: &str) -> Result<Vec<RawEntity>>;

    /// Name the model was loaded under.
    fn model_name(&self) -> &str;
}

/// Obtains NER models by name.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load an installed model. `Ok(None)` means the model is not installed.
    async fn load(&self, name: &str) -> Result<Option<Arc<dyn NerModel>>>;

    /// Acquire a model that is not installed (download, unpack, ...).
    async fn download(&self, name: &str) -> Result<()>;
}

/// Memoizing registry of NER models, keyed by model name.
///
/// Acquisition runs under a registry-wide mutex, so concurrent first use of a
/// model triggers exactly one load. Each acquisition is bounded by a timeout;
/// expiry is reported as [`DetectError::Timeout`]. A model that failed is not
/// retried until the cooldown has passed, so a dead backend does not stall
/// every call for the full timeout.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    state: Mutex<RegistryState>,
    acquire_timeout: Duration,
    retry_cooldown: Duration,
}

#[derive(Default)]
struct RegistryState {
    models: HashMap<String, Arc<dyn NerModel>>,
    failures: HashMap<String, Instant>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("acquire_timeout", &self.acquire_timeout)
            .field("retry_cooldown", &self.retry_cooldown)
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Create a registry around a loader.
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>, acquire_timeout: Duration) -> Self {
        Self {
            loader,
            state: Mutex::new(RegistryState::default()),
            acquire_timeout,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }

    /// Set how long a failed model is skipped before it is tried again.
    #[must_use]
    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    /// Get a model, loading or acquiring it on first use.
    ///
    /// # Errors
    /// Returns `ModelLoad` if the model cannot be loaded even after
    /// acquisition (or failed recently), and `Timeout` if acquisition exceeds
    /// the configured budget.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn NerModel>> {
        let mut state = self.state.lock().await;

        if let Some(model) = state.models.get(name) {
            return Ok(Arc::clone(model));
        }

        if let Some(failed_at) = state.failures.get(name) {
            if failed_at.elapsed() < self.retry_cooldown {
                return Err(DetectError::ModelLoad {
                    model: name.to_string(),
                    message: "recently failed, waiting before retrying".to_string(),
                });
            }
        }

        let result = match tokio::time::timeout(self.acquire_timeout, self.acquire(name)).await {
            Ok(result) => result,
            Err(_) => Err(DetectError::Timeout {
                model: name.to_string(),
                seconds: self.acquire_timeout.as_secs(),
            }),
        };

        match result {
            Ok(model) => {
                tracing::info!(model = name, "Loaded NER model");
                state.failures.remove(name);
                state.models.insert(name.to_string(), Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                tracing::warn!(model = name, error = %e, "Failed to acquire NER model");
                state.failures.insert(name.to_string(), Instant::now());
                Err(e)
            }
        }
    }

    /// Get the first model in `preferences` that can be obtained.
    ///
    /// # Errors
    /// Returns `ModelUnavailable` listing every name tried if none loads.
    pub async fn first_available(&self, preferences: &[String]) -> Result<Arc<dyn NerModel>> {
        for name in preferences {
            tracing::debug!(model = %name, "Attempting to load NER model");
            match self.get(name).await {
                Ok(model) => return Ok(model),
                Err(e) => tracing::debug!(model = %name, error = %e, "NER model not usable"),
            }
        }

        Err(DetectError::ModelUnavailable {
            tried: preferences.to_vec(),
        })
    }

    /// Whether a model is already loaded.
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.state.lock().await.models.contains_key(name)
    }

    async fn acquire(&self, name: &str) -> Result<Arc<dyn NerModel>> {
        if let Some(model) = self.loader.load(name).await? {
            return Ok(model);
        }

        tracing::info!(model = name, "NER model not installed, attempting download");
        self.loader.download(name).await?;

        self.loader
            .load(name)
            .await?
            .ok_or_else(|| DetectError::ModelLoad {
                model: name.to_string(),
                message: "model still missing after download".to_string(),
            })
    }
}
