//! Entry points invoked by the host conversation framework.
//!
//! Every hook degrades instead of failing: whatever goes wrong is logged and
//! the input is handed back unchanged. Only [`PrivacyHooks::apply_settings`]
//! reports errors, since invalid configuration must reach whoever set it.

use crate::error::Result;
use crate::pipeline::{build_registry, Anonymizer};
use crate::session::SessionState;
use crate::substitution;
use masque_core::AnonymizerConfig;
use masque_db::AllowlistStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Source recorded for documents that carry none.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A document entering long-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document text.
    pub content: String,
    /// Originating URL or file name; empty when unknown.
    #[serde(default)]
    pub source: String,
}

impl Document {
    /// Create a document.
    #[must_use]
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// A response on its way to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Response as produced, placeholders included.
    pub content: String,
    /// Response with placeholders restored, when reversible chat applies.
    pub deanonymized: Option<String>,
}

impl OutboundMessage {
    /// Text to show the user.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.deanonymized.as_deref().unwrap_or(&self.content)
    }
}

/// Host-facing hooks around a swappable [`Anonymizer`].
#[derive(Debug)]
pub struct PrivacyHooks {
    anonymizer: RwLock<Arc<Anonymizer>>,
}

impl PrivacyHooks {
    /// Wrap a configured anonymizer.
    #[must_use]
    pub fn new(anonymizer: Anonymizer) -> Self {
        Self {
            anonymizer: RwLock::new(Arc::new(anonymizer)),
        }
    }

    /// Build hooks from configuration.
    ///
    /// # Errors
    /// Returns `PrivacyError` if the configuration is invalid or the NER
    /// client cannot be built.
    pub async fn from_config(config: AnonymizerConfig) -> Result<Self> {
        Ok(Self::new(Anonymizer::from_config(config).await?))
    }

    /// Anonymizer currently in effect.
    #[must_use]
    pub fn anonymizer(&self) -> Arc<Anonymizer> {
        Arc::clone(&self.anonymizer.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Anonymize an incoming user message.
    ///
    /// With reversible chat on, the new placeholders are merged into the
    /// session so the response can be restored.
    pub async fn on_user_message(&self, session: &mut SessionState, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let anonymizer = self.anonymizer();
        let (anonymized, mapping) = anonymizer.anonymize(text).await;

        if !mapping.is_empty() {
            tracing::info!(count = mapping.len(), "User message anonymized");
        }

        if anonymizer.config().reversible_chat {
            let added = session.record(mapping);
            tracing::debug!(
                added,
                total = session.mapping().len(),
                "Stored placeholder mappings"
            );
        }

        anonymized
    }

    /// Restore placeholders in an outgoing response.
    #[must_use]
    pub fn on_response(&self, session: &SessionState, content: &str) -> OutboundMessage {
        let mut message = OutboundMessage {
            content: content.to_string(),
            deanonymized: None,
        };

        if !self.anonymizer().config().reversible_chat {
            tracing::debug!("Reversible chat disabled, skipping deanonymization");
            return message;
        }
        if session.mapping().is_empty() || content.is_empty() {
            return message;
        }

        let restored = substitution::deanonymize(content, session.mapping());
        if restored != content {
            tracing::info!("Response deanonymized");
        }
        message.deanonymized = Some(restored);
        message
    }

    /// Process a document before it is stored.
    ///
    /// With the allowlist on, every detected entity is allowlisted under the
    /// document's source. With rabbit-hole anonymization on and the source
    /// not on the allowed-website list, the content is anonymized against
    /// the allowlist as it stood before this document.
    pub async fn on_document_ingest(&self, document: Document) -> Document {
        let anonymizer = self.anonymizer();
        let config = anonymizer.config();

        let learn = config.enable_allowedlist;
        let rewrite = config.anonymize_rabbit_hole && !Self::is_exempt(&anonymizer, &document);
        if (!learn && !rewrite) || document.content.is_empty() {
            return document;
        }

        let spans = anonymizer.detect(&document.content).await;

        let content = if rewrite {
            let (anonymized, mapping) = anonymizer.substitute(&document.content, &spans);
            if !mapping.is_empty() {
                tracing::info!(count = mapping.len(), "Document anonymized");
            }
            anonymized
        } else {
            document.content.clone()
        };

        if learn {
            let source = if document.source.is_empty() {
                UNKNOWN_SOURCE
            } else {
                document.source.as_str()
            };
            anonymizer.learn(&spans, source).await;
        }

        Document {
            content,
            source: document.source,
        }
    }

    fn is_exempt(anonymizer: &Anonymizer, document: &Document) -> bool {
        let allowed = anonymizer.is_allowed_source(&document.source);
        if allowed {
            tracing::info!(source = %document.source, "Skipping anonymization for allowed source");
        }
        allowed
    }

    /// Retract the allowances granted by a removed document.
    ///
    /// Returns the number of entities dropped from the allowlist.
    pub async fn on_source_removed(&self, source: &str) -> usize {
        match self.anonymizer().allowlist().remove_source(source).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(source, error = %e, "Failed to retract allowlist source");
                0
            }
        }
    }

    /// Validate and install a new configuration.
    ///
    /// The NER backend and the allowlist store are rebuilt only when their
    /// settings change. A set `reset_db` wipes the allowlist; the returned
    /// configuration has it cleared, ready to be persisted.
    ///
    /// # Errors
    /// Returns `PrivacyError::InvalidConfiguration` when validation fails;
    /// the previous configuration stays in effect.
    pub async fn apply_settings(&self, mut config: AnonymizerConfig) -> Result<AnonymizerConfig> {
        config.validate()?;
        let current = self.anonymizer();

        let registry = if current.config().ner == config.ner {
            Arc::clone(current.registry())
        } else {
            tracing::info!(endpoint = %config.ner.endpoint, "NER settings changed");
            Arc::new(build_registry(&config)?)
        };

        let allowlist = if current.config().sqlite_db_path == config.sqlite_db_path {
            Arc::clone(current.allowlist())
        } else {
            tracing::info!(
                path = %config.sqlite_db_path.display(),
                "Allowlist location changed"
            );
            Arc::new(AllowlistStore::open(config.sqlite_db_path.clone()).await)
        };

        if config.reset_db {
            match allowlist.reset().await {
                Ok(()) => tracing::warn!("Allowlist database reset"),
                Err(e) => tracing::error!(error = %e, "Failed to reset allowlist database"),
            }
            config.reset_db = false;
        }

        let next = Anonymizer::new(config.clone(), registry, allowlist);
        *self
            .anonymizer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        Ok(config)
    }
}
