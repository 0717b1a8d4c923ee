//! Regex-based detection of structurally regular PII.
//!
//! Covers email addresses, phone numbers and Italian fiscal codes. The
//! detector is stateless with respect to its input: patterns are compiled once
//! and shared, and `detect` never fails.

use crate::resolver::resolve_overlaps;
use masque_core::{AnonymizerConfig, EntityType, Span};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::RangeInclusive;

/// Accepted number of digits in a phone match.
pub const PHONE_DIGITS: RangeInclusive<usize> = 7..=15;

/// Pattern detector for emails, phone numbers and fiscal codes.
///
/// Each enabled category is scanned independently over the full text; the
/// candidates are then merged through [`resolve_overlaps`], the same rule the
/// pipeline applies across detectors.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<PiiPattern>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDetector {
    /// Create a detector with every pattern category enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_categories(&[EntityType::Email, EntityType::Phone, EntityType::FiscalCode])
    }

    /// Create a detector for the categories switched on in `config`.
    #[must_use]
    pub fn from_config(config: &AnonymizerConfig) -> Self {
        let enabled: Vec<EntityType> = EntityType::ALL
            .into_iter()
            .filter(|t| !t.is_statistical() && config.category_enabled(*t))
            .collect();
        Self::with_categories(&enabled)
    }

    /// Create a detector for an explicit set of categories.
    ///
    /// Categories without a pattern (the NER ones) are ignored.
    #[must_use]
    pub fn with_categories(categories: &[EntityType]) -> Self {
        let patterns = default_patterns()
            .into_iter()
            .filter(|p| categories.contains(&p.entity_type))
            .collect();
        Self { patterns }
    }

    /// Categories this detector scans for.
    pub fn categories(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.patterns.iter().map(|p| p.entity_type)
    }

    /// Detect PII spans in `text`.
    ///
    /// Returns non-overlapping spans sorted by start offset. The empty string
    /// yields no spans.
    #[must_use]
    pub fn detect(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();

        for pattern in &self.patterns {
            match pattern.entity_type {
                EntityType::Phone => collect_phones(text, &pattern.regex, &mut spans),
                entity_type => spans.extend(
                    pattern
                        .regex
                        .find_iter(text)
                        .filter_map(|m| Span::from_source(text, m.start(), m.end(), entity_type)),
                ),
            }
        }

        resolve_overlaps(spans)
    }
}

/// Whether a phone candidate has an acceptable number of digits.
///
/// Rejects short numeric codes and long digit runs (ISBNs, card numbers) that
/// the phone pattern matches syntactically.
#[must_use]
pub fn is_plausible_phone(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    PHONE_DIGITS.contains(&digits)
}

/// Most digits a phone match may span. A `00` prefix allows one more digit
/// than the bare form; the result is still subject to [`PHONE_DIGITS`].
const PHONE_MAX_DIGITS: usize = 15;
const PHONE_MAX_DIGITS_00: usize = 16;

/// Scan for phone numbers.
///
/// The regex finds the longest digit run at each start; the end is then
/// shortened one digit at a time until it is not followed by another digit.
/// Forms without a `+` must also not be preceded by a digit. A match that
/// fails the digit-count filter is still consumed.
fn collect_phones(text: &str, regex: &Regex, spans: &mut Vec<Span>) {
    let mut pos = 0;
    while let Some(m) = regex.find_at(text, pos) {
        match phone_end(text, m.start(), m.as_str()) {
            Some(end) => {
                if is_plausible_phone(&text[m.start()..end]) {
                    if let Some(span) = Span::from_source(text, m.start(), end, EntityType::Phone) {
                        spans.push(span);
                    }
                }
                pos = end;
            }
            None => {
                let step = m.as_str().chars().next().map_or(1, char::len_utf8);
                pos = m.start() + step;
            }
        }
    }
}

/// End offset of the phone number starting at `start`, given the longest
/// candidate run `run` found there.
fn phone_end(text: &str, start: usize, run: &str) -> Option<usize> {
    let plus = run.starts_with('+');
    let digit_before = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_digit());
    if !plus && digit_before {
        return None;
    }

    let max_digits = if run.starts_with("00") {
        PHONE_MAX_DIGITS_00
    } else {
        PHONE_MAX_DIGITS
    };

    // Offsets just past each digit, in order.
    let digit_ends: Vec<usize> = run
        .char_indices()
        .filter(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| start + i + 1)
        .take(max_digits)
        .collect();

    digit_ends
        .iter()
        .enumerate()
        .rev()
        .take_while(|(i, _)| i + 1 >= *PHONE_DIGITS.start())
        .map(|(_, &end)| end)
        .find(|&end| {
            plus || !text[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
}

/// A PII detection pattern.
#[derive(Clone)]
struct PiiPattern {
    entity_type: EntityType,
    regex: Regex,
}

impl std::fmt::Debug for PiiPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiiPattern")
            .field("entity_type", &self.entity_type)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// Default PII detection patterns.
fn default_patterns() -> Vec<PiiPattern> {
    vec![
        PiiPattern {
            entity_type: EntityType::Email,
            regex: EMAIL_REGEX.clone(),
        },
        PiiPattern {
            entity_type: EntityType::Phone,
            regex: PHONE_REGEX.clone(),
        },
        PiiPattern {
            entity_type: EntityType::FiscalCode,
            regex: FISCAL_CODE_REGEX.clone(),
        },
    ]
}

// Compiled regex patterns
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[A-Za-z0-9](?:[A-Za-z0-9._+-]*[A-Za-z0-9])?@[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?\.[A-Za-z]{2,}\b",
    )
    .expect("valid email regex")
});

// Optional `+`, then 7 to 16 digits where each digit may be followed by one
// whitespace character. Covers `+39 ...`, `0039...` and bare digit runs.
static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?(?:[0-9]\s?){6,15}[0-9]").expect("valid phone regex"));

// Codice fiscale: 6 letters, 2 digits, letter, 2 digits, letter, 3 digits, letter
static FISCAL_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{6}[0-9]{2}[A-Z][0-9]{2}[A-Z][0-9]{3}[A-Z]\b")
        .expect("valid fiscal code regex")
});
