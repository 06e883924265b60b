//! Set of object types that produced at least one record.

use dashmap::DashSet;
use std::sync::Arc;

/// Append-only set of type names, shared by every crawler of a run.
#[derive(Debug, Clone, Default)]
pub struct CoverageSet {
    inner: Arc<DashSet<String>>,
}

impl CoverageSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `type_name` produced a record. Idempotent.
    pub fn insert(&self, type_name: &str) {
        if !self.inner.contains(type_name) {
            self.inner.insert(type_name.to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.inner.contains(type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Sorted copy of the current members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|name| name.key().clone()).collect();
        names.sort();
        names
    }
}
