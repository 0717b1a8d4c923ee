//! Placeholder to original-text mapping.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Placeholders and the text they replaced, in insertion order.
///
/// Serializes as a JSON object whose key order follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMapping(IndexMap<String, String>);

impl PlaceholderMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `placeholder -> original`.
    ///
    /// Returns `false` and leaves the mapping untouched when the placeholder
    /// is already present.
    pub fn insert(&mut self, placeholder: impl Into<String>, original: impl Into<String>) -> bool {
        match self.0.entry(placeholder.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(original.into());
                true
            }
        }
    }

    /// Original text for `placeholder`.
    #[must_use]
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.0.get(placeholder).map(String::as_str)
    }

    /// Whether `placeholder` is present.
    #[must_use]
    pub fn contains_key(&self, placeholder: &str) -> bool {
        self.0.contains_key(placeholder)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, o)| (p.as_str(), o.as_str()))
    }

    /// Placeholders in insertion order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Append the entries of `other` whose placeholders are not yet present.
    ///
    /// Returns the number of entries added.
    pub fn merge(&mut self, other: PlaceholderMapping) -> usize {
        let mut added = 0;
        for (placeholder, original) in other.0 {
            if self.insert(placeholder, original) {
                added += 1;
            }
        }
        added
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Parse a mapping saved with [`PlaceholderMapping::to_json`].
    ///
    /// # Errors
    /// Returns `PrivacyError::Serialization` unless `json` is an object of
    /// strings.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed JSON object, keys in insertion order.
    ///
    /// # Errors
    /// Returns `PrivacyError::Serialization` if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a PlaceholderMapping {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromIterator<(String, String)> for PlaceholderMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (placeholder, original) in iter {
            mapping.insert(placeholder, original);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_value() {
        let mut mapping = PlaceholderMapping::new();
        assert!(mapping.insert("[EMAIL_0000abcd]", "a@b.io"));
        assert!(!mapping.insert("[EMAIL_0000abcd]", "other@b.io"));

        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("[EMAIL_0000abcd]"), Some("a@b.io"));
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut session: PlaceholderMapping =
            [("[PERSON_11111111]".to_string(), "Ada".to_string())]
                .into_iter()
                .collect();
        let incoming: PlaceholderMapping = [
            ("[PERSON_11111111]".to_string(), "Grace".to_string()),
            ("[EMAIL_22222222]".to_string(), "ada@x.io".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(session.merge(incoming), 1);
        assert_eq!(
            session.iter().collect::<Vec<_>>(),
            vec![("[PERSON_11111111]", "Ada"), ("[EMAIL_22222222]", "ada@x.io")]
        );
    }

    #[test]
    fn test_json_preserves_order() {
        let mut mapping = PlaceholderMapping::new();
        mapping.insert("[PHONE_ffffffff]", "+39 011 555 1234");
        mapping.insert("[EMAIL_00000000]", "a@b.io");

        let json = serde_json::to_string(&mapping).expect("serialize mapping");
        assert_eq!(
            json,
            r#"{"[PHONE_ffffffff]":"+39 011 555 1234","[EMAIL_00000000]":"a@b.io"}"#
        );

        let back = PlaceholderMapping::from_json(&json).expect("deserialize mapping");
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_rejects_non_string_values() {
        assert!(PlaceholderMapping::from_json(r#"{"[EMAIL_00000000]": 3}"#).is_err());
        assert!(PlaceholderMapping::from_json("[]").is_err());
    }

    #[test]
    fn test_clear() {
        let mut mapping = PlaceholderMapping::new();
        mapping.insert("[EMAIL_00000000]", "a@b.io");
        mapping.clear();
        assert!(mapping.is_empty());
        assert!(!mapping.contains_key("[EMAIL_00000000]"));
    }
}
