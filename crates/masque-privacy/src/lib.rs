//! Masque Privacy - reversible anonymization.
//!
//! Turns detected spans into placeholders and back, and exposes the hooks a
//! conversation host calls on user messages, responses and documents.
//!
//! # Flow
//!
//! ```text
//! text ─► PatternDetector ─┐
//!      └► NER detector  ───┴► resolve_overlaps ─► substitute (skip allowlisted)
//!                                                  │
//!                      (anonymized text, PlaceholderMapping) ◄┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use masque_core::AnonymizerConfig;
//! use masque_privacy::{PrivacyHooks, SessionState};
//!
//! let hooks = PrivacyHooks::from_config(AnonymizerConfig::load()?).await?;
//! let mut session = SessionState::new();
//!
//! let outgoing = hooks.on_user_message(&mut session, "I am jane@example.com").await;
//! let reply = hooks.on_response(&session, &llm_reply_to(outgoing));
//! println!("{}", reply.display_text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod hooks;
pub mod mapping;
pub mod pipeline;
pub mod session;
pub mod sources;
pub mod substitution;

pub use error::{PrivacyError, Result};
pub use hooks::{Document, OutboundMessage, PrivacyHooks, UNKNOWN_SOURCE};
pub use mapping::PlaceholderMapping;
pub use pipeline::{build_registry, Anonymizer};
pub use session::SessionState;
pub use sources::{is_allowed_source, parse_allowed_sites, AllowedSite};
pub use substitution::{anonymize, deanonymize, placeholder};

#[cfg(test)]
pub(crate) mod testing {
    //! Anonymizers backed by an in-memory allowlist.

    use crate::pipeline::{build_registry, Anonymizer};
    use masque_core::AnonymizerConfig;
    use masque_db::AllowlistStore;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Configuration with every NER category off.
    pub fn patterns_only() -> AnonymizerConfig {
        AnonymizerConfig {
            anonymize_names: false,
            anonymize_locations: false,
            anonymize_organizations: false,
            sqlite_db_path: PathBuf::from(":memory:"),
            ..Default::default()
        }
    }

    pub async fn memory_anonymizer(config: AnonymizerConfig) -> Anonymizer {
        let registry = Arc::new(build_registry(&config).expect("build registry"));
        let allowlist = Arc::new(
            AllowlistStore::try_open(":memory:")
                .await
                .expect("open in-memory allowlist"),
        );
        Anonymizer::new(config, registry, allowlist)
    }
}
