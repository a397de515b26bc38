//! Batch-scoped local → remote identifier mapping

use std::collections::HashMap;

/// Identifiers assigned while processing one batch
///
/// Created fresh for every batch and handed back in the response, so nothing
/// leaks from one batch into another.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    entries: HashMap<String, String>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, local_id: impl Into<String>, remote_id: impl Into<String>) {
        self.entries.insert(local_id.into(), remote_id.into());
    }

    pub fn get(&self, local_id: &str) -> Option<&str> {
        self.entries.get(local_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.entries
    }
}
