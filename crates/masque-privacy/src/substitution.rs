//! Reversible substitution of detected spans with placeholders.
//!
//! Placeholders look like `[EMAIL_3f9c01ab]`: the entity type followed by
//! eight random hex digits. Each replaced occurrence gets a fresh placeholder,
//! even when the same text repeats.

use crate::mapping::PlaceholderMapping;
use masque_core::{EntityType, Span};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use uuid::Uuid;

/// Length of the random placeholder suffix.
pub const SUFFIX_LEN: usize = 8;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[A-Z]+(?:_[A-Z]+)*_[0-9a-f]{8}\]").expect("valid placeholder regex")
});

/// Generate a fresh placeholder for `entity_type`.
#[must_use]
pub fn placeholder(entity_type: EntityType) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("[{}_{}]", entity_type.as_str(), &id[..SUFFIX_LEN])
}

/// Replace every span not accepted by `is_allowed` with a placeholder.
///
/// `spans` must be non-overlapping and taken from `text`. Spans whose offsets
/// do not match `text` are skipped. Returns the rewritten text and the
/// mapping of the spans actually replaced, in text order.
pub fn anonymize<F>(text: &str, spans: &[Span], is_allowed: F) -> (String, PlaceholderMapping)
where
    F: Fn(&str) -> bool,
{
    let mut mapping = PlaceholderMapping::new();
    let mut replacements = Vec::with_capacity(spans.len());

    for span in spans {
        if text.get(span.start..span.end) != Some(span.text.as_str()) {
            tracing::warn!(
                start = span.start,
                end = span.end,
                "Skipping span that does not match the source text"
            );
            continue;
        }
        if is_allowed(&span.text) {
            tracing::debug!(entity_type = %span.entity_type, "Span is allowlisted");
            continue;
        }

        // Sibling keys must differ; regenerate on the rare clash.
        let mut token = placeholder(span.entity_type);
        while mapping.contains_key(&token) {
            token = placeholder(span.entity_type);
        }
        mapping.insert(token.clone(), span.text.clone());
        replacements.push((span.start, span.end, token));
    }

    // Apply replacements in reverse order to maintain indices
    replacements.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    let mut result = text.to_string();
    for (start, end, token) in &replacements {
        result.replace_range(*start..*end, token);
    }

    (result, mapping)
}

/// Restore the original text of every placeholder known to `mapping`.
///
/// Placeholders absent from the mapping are left as they are.
#[must_use]
pub fn deanonymize(text: &str, mapping: &PlaceholderMapping) -> String {
    if mapping.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            mapping
                .get(&caps[0])
                .map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}
