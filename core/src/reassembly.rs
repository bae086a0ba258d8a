//! Buffering of inbound multi-part messages

use std::collections::{BTreeMap, HashMap};

/// Buffers fragments keyed by message id, then by part index
#[derive(Debug, Default)]
pub struct MessageReassembler {
    buffers: HashMap<String, BTreeMap<u32, String>>,
}

impl MessageReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_buffer(&mut self, message_id: &str) {
        self.buffers.entry(message_id.to_string()).or_default();
    }

    /// Record a fragment. A repeated part index replaces the earlier payload.
    pub fn add_fragment(&mut self, message_id: &str, part: u32, payload: &str) {
        self.buffers
            .entry(message_id.to_string())
            .or_default()
            .insert(part, payload.to_string());
    }

    pub fn is_complete(&self, message_id: &str, total: u32) -> bool {
        self.buffers
            .get(message_id)
            .map(|parts| parts.len() == total as usize)
            .unwrap_or(false)
    }

    /// Concatenate the buffered fragments in part order and drop the entry
    pub fn drain_sorted(&mut self, message_id: &str) -> Option<String> {
        self.buffers
            .remove(message_id)
            .map(|parts| parts.into_values().collect())
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of messages with fragments pending
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}
