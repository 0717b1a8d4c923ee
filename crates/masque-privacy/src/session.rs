//! Per-conversation state.

use crate::mapping::PlaceholderMapping;
use serde::{Deserialize, Serialize};

/// Placeholder mapping accumulated over one conversation.
///
/// Owned by the host's session; dropped when the conversation ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    mapping: PlaceholderMapping,
}

impl SessionState {
    /// Start an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping of every placeholder issued in this session.
    #[must_use]
    pub fn mapping(&self) -> &PlaceholderMapping {
        &self.mapping
    }

    /// Merge the mapping produced for one message. Returns the number of new
    /// placeholders.
    pub fn record(&mut self, mapping: PlaceholderMapping) -> usize {
        self.mapping.merge(mapping)
    }

    /// Forget every placeholder.
    pub fn clear(&mut self) {
        self.mapping.clear();
    }
}
