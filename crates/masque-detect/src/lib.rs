//! Masque Detect - PII span detection.
//!
//! Two independent detectors produce [`Span`](masque_core::Span)s over a text:
//!
//! - [`PatternDetector`]: regular expressions for emails, phone numbers and
//!   fiscal codes. Always available, never fails.
//! - [`StatisticalDetector`]: adapter over an external NER model for person,
//!   organization and location names, filtered by per-category confidence.
//!
//! Both resolve their own overlaps with [`resolve_overlaps`], and the pipeline
//! applies the same rule again to the concatenation of their outputs.
//!
//! # Model lifecycle
//!
//! ```text
//! ModelRegistry::get(name)
//!     ├─ cached?            → shared Arc<dyn NerModel>
//!     └─ ModelLoader::load  → installed? → cache
//!            └─ download → load again   → cache
//! ```
//!
//! Acquisition is serialized by the registry and bounded by a timeout, so a
//! missing model degrades detection to pattern-only instead of blocking.
//!
//! # Example
//!
//! ```rust
//! use masque_detect::PatternDetector;
//!
//! let spans = PatternDetector::new().detect("mail jane@example.com");
//! assert_eq!(spans[0].text, "jane@example.com");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod model;
pub mod pattern;
pub mod providers;
pub mod resolver;
pub mod statistical;

// Re-export commonly used types
pub use error::{DetectError, Result};
pub use model::{ModelLoader, ModelRegistry, NerModel, RawEntity};
pub use pattern::PatternDetector;
pub use providers::{HttpNerLoader, HttpNerModel};
pub use resolver::resolve_overlaps;
pub use statistical::{map_label, StatisticalDetector};
