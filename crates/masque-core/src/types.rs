//! Shared types used across the Masque crates.
//!
//! A [`Span`] is a detected PII occurrence over a source string. Offsets are
//! byte offsets into that string, so `&source[span.start..span.end]` is always
//! the span text.

use crate::error::MasqueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categories of PII the detectors can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// Email address
    Email,
    /// Phone number
    Phone,
    /// Italian fiscal code (codice fiscale)
    FiscalCode,
    /// Person name
    Person,
    /// Organization name
    Organization,
    /// Place, facility or geopolitical entity
    Location,
}

impl EntityType {
    /// Every entity type, pattern-based categories first.
    pub const ALL: [EntityType; 6] = [
        Self::Email,
        Self::Phone,
        Self::FiscalCode,
        Self::Person,
        Self::Organization,
        Self::Location,
    ];

    /// Get the string representation used in placeholders and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::FiscalCode => "FISCAL_CODE",
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
        }
    }

    /// Whether this category is produced by the statistical (NER) detector.
    #[must_use]
    pub fn is_statistical(&self) -> bool {
        matches!(self, Self::Person | Self::Organization | Self::Location)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = MasqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MasqueError::Validation(format!("unknown entity type '{s}'")))
    }
}

/// A detected PII occurrence.
///
/// Invariant: `start < end` and `text == source[start..end]` for the string
/// the span was detected in. Spans are transient and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// Detected category
    pub entity_type: EntityType,
    /// The detected value
    pub text: String,
}

impl Span {
    /// Build a span over `source`, taking its text from the source itself.
    ///
    /// Returns `None` when the range is empty, out of bounds, or does not fall
    /// on UTF-8 character boundaries.
    #[must_use]
    pub fn from_source(
        source: &str,
        start: usize,
        end: usize,
        entity_type: EntityType,
    ) -> Option<Self> {
        if start >= end {
            return None;
        }
        let text = source.get(start..end)?;
        Some(Self {
            start,
            end,
            entity_type,
            text: text.to_string(),
        })
    }

    /// Length of the span in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no bytes. Never true for a span built by
    /// [`Span::from_source`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether two spans share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip_str() {
        for entity_type in EntityType::ALL {
            let parsed: EntityType = entity_type.as_str().parse().expect("parse entity type");
            assert_eq!(parsed, entity_type);
        }
        assert!("ADDRESS".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_type_serialization() {
        let json = serde_json::to_string(&EntityType::FiscalCode).expect("serialize");
        assert_eq!(json, r#""FISCAL_CODE""#);
    }

    #[test]
    fn test_statistical_categories() {
        assert!(EntityType::Person.is_statistical());
        assert!(EntityType::Location.is_statistical());
        assert!(!EntityType::Email.is_statistical());
        assert!(!EntityType::FiscalCode.is_statistical());
    }

    #[test]
    fn test_span_from_source() {
        let source = "mail jane@example.com now";
        let span = Span::from_source(source, 5, 21, EntityType::Email).expect("valid span");
        assert_eq!(span.text, "jane@example.com");
        assert_eq!(span.len(), 16);

        assert!(Span::from_source(source, 5, 5, EntityType::Email).is_none());
        assert!(Span::from_source(source, 5, 99, EntityType::Email).is_none());
    }

    #[test]
    fn test_span_rejects_split_characters() {
        let source = "Zoë";
        // 'ë' is two bytes starting at offset 2
        assert!(Span::from_source(source, 0, 3, EntityType::Person).is_none());
        assert!(Span::from_source(source, 0, 4, EntityType::Person).is_some());
    }

    #[test]
    fn test_span_overlaps() {
        let a = Span::from_source("abcdefgh", 0, 5, EntityType::Person).expect("span");
        let b = Span::from_source("abcdefgh", 4, 8, EntityType::Person).expect("span");
        let c = Span::from_source("abcdefgh", 5, 8, EntityType::Person).expect("span");
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
