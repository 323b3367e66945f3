//! Ordered index of pending job ids.
//!
//! Entries are kept in descending priority. A new entry goes in front of the
//! first entry with a strictly lower priority, so equal priorities stay in
//! insertion order. Queue depth is expected to be small (human-triggered
//! publishing), so a sorted `Vec` with linear insertion is enough.

use crate::types::JobId;

#[derive(Debug, Default)]
pub struct PriorityIndex {
    entries: Vec<(JobId, u8)>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `id` at its priority position. An id already present is moved.
    pub fn insert(&mut self, id: JobId, priority: u8) {
        self.remove(&id);

        let position = self
            .entries
            .iter()
            .position(|(_, existing)| *existing < priority)
            .unwrap_or(self.entries.len());

        self.entries.insert(position, (id, priority));
    }

    /// First id from the front satisfying `predicate`. Does not remove it.
    pub fn next<F>(&self, mut predicate: F) -> Option<JobId>
    where
        F: FnMut(&JobId) -> bool,
    {
        self.entries
            .iter()
            .map(|(id, _)| id)
            .find(|id| predicate(id))
            .copied()
    }

    /// Remove `id` wherever it occurs. Returns whether it was present.
    pub fn remove(&mut self, id: &JobId) -> bool {
        match self.entries.iter().position(|(existing, _)| existing == id) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entries.iter().any(|(existing, _)| existing == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
