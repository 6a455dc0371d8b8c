//! Targets picked before the host record exists.

use serde::Serialize;

/// One picked target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingItem {
    /// Id of the target record
    pub target_id: String,
    /// Display text shown while the selection is pending
    pub display_name: String,
}

/// Ordered, duplicate-free set of targets chosen in create mode.
///
/// Nothing here reaches the data API until
/// [`LookupSession::commit`](super::LookupSession::commit) runs after the
/// host record has been saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingSelection {
    items: Vec<PendingItem>,
}

impl PendingSelection {
    /// An empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target; returns `false` if it was already selected.
    pub fn add(&mut self, target_id: impl Into<String>, display_name: impl Into<String>) -> bool {
        let target_id = target_id.into();
        if self.contains(&target_id) {
            return false;
        }
        self.items.push(PendingItem {
            target_id,
            display_name: display_name.into(),
        });
        true
    }

    /// Remove a target; returns `false` if it was not selected.
    pub fn remove(&mut self, target_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.target_id.eq_ignore_ascii_case(target_id));
        self.items.len() != before
    }

    /// Whether `target_id` is selected.
    pub fn contains(&self, target_id: &str) -> bool {
        self.items.iter().any(|item| item.target_id.eq_ignore_ascii_case(target_id))
    }

    /// Selected targets in selection order.
    pub fn items(&self) -> &[PendingItem] {
        &self.items
    }

    /// Number of selected targets.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every selected target.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_and_deduplicated() {
        let mut pending = PendingSelection::new();
        assert!(pending.add("c2", "Bob"));
        assert!(pending.add("c1", "Ann"));
        assert!(!pending.add("C2", "Bob again"));

        let ids: Vec<_> = pending.items().iter().map(|i| i.target_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);

        assert!(pending.remove("c2"));
        assert!(!pending.remove("c2"));
        assert_eq!(pending.len(), 1);
        pending.clear();
        assert!(pending.is_empty());
    }
}
