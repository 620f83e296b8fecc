//! Linear undo/redo over full store snapshots.
//!
//! One entry per committed user operation, however many regions that
//! operation created or destroyed. Each image's store gets its own history;
//! undo never crosses image boundaries.

use crate::store::{RegionStore, StoreSnapshot};

/// Maximum number of undo steps kept before the oldest are dropped.
const MAX_HISTORY_DEPTH: usize = 100;

pub struct VersionedHistory {
    /// Pre-mutation snapshots, most recent last.
    undo_stack: Vec<StoreSnapshot>,
    redo_stack: Vec<StoreSnapshot>,
    depth: usize,
}

impl Default for VersionedHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedHistory {
    pub fn new() -> Self {
        Self::with_depth(MAX_HISTORY_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            depth,
        }
    }

    /// Record the store's state immediately before a mutation commits.
    ///
    /// Any new committed mutation discards the redo stack: history stays
    /// linear.
    pub fn record(&mut self, store: &RegionStore) {
        self.redo_stack.clear();
        self.undo_stack.push(store.snapshot());
        while self.undo_stack.len() > self.depth {
            self.undo_stack.remove(0);
        }
    }

    /// Roll the store back one committed operation. Returns false when
    /// there is nothing to undo.
    pub fn undo(&mut self, store: &mut RegionStore) -> bool {
        match self.undo_stack.pop() {
            Some(snapshot) => {
                self.redo_stack.push(store.snapshot());
                store.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Re-apply the most recently undone operation.
    pub fn redo(&mut self, store: &mut RegionStore) -> bool {
        match self.redo_stack.pop() {
            Some(snapshot) => {
                self.undo_stack.push(store.snapshot());
                store.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Region, RegionGeometry};

    fn square_region(left: f32, side: f32) -> Region {
        Region::from_geometry(RegionGeometry {
            exterior: vec![
                [left, 0.0],
                [left + side, 0.0],
                [left + side, side],
                [left, side],
            ],
            holes: vec![],
        })
        .expect("Should build region")
    }

    #[test]
    fn test_undo_redo_inverse_law() {
        let mut store = RegionStore::new();
        let mut history = VersionedHistory::new();

        let initial = serde_json::to_string(&store.snapshot()).expect("Should serialize");

        // ten committed mutations
        for i in 0..10 {
            history.record(&store);
            store
                .add(square_region(i as f32 * 10.0, 5.0), None)
                .expect("Should add");
        }
        let after = serde_json::to_string(&store.snapshot()).expect("Should serialize");
        assert_eq!(store.len(), 10);

        for _ in 0..10 {
            assert!(history.undo(&mut store));
        }
        assert!(!history.undo(&mut store));
        assert_eq!(
            serde_json::to_string(&store.snapshot()).expect("Should serialize"),
            initial,
            "ten undos restore the initial store byte-for-byte"
        );

        for _ in 0..10 {
            assert!(history.redo(&mut store));
        }
        assert!(!history.redo(&mut store));
        assert_eq!(
            serde_json::to_string(&store.snapshot()).expect("Should serialize"),
            after
        );
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let mut store = RegionStore::new();
        let mut history = VersionedHistory::new();

        history.record(&store);
        store.add(square_region(0.0, 5.0), None).expect("Should add");
        history.undo(&mut store);
        assert!(history.can_redo());

        history.record(&store);
        store.add(square_region(10.0, 5.0), None).expect("Should add");
        assert!(!history.can_redo(), "no branching history");
    }

    #[test]
    fn test_one_entry_per_operation() {
        let mut store = RegionStore::new();
        let mut history = VersionedHistory::new();

        // one operation producing three regions is a single undo step
        history.record(&store);
        store
            .add_all(vec![
                square_region(0.0, 5.0),
                square_region(10.0, 5.0),
                square_region(20.0, 5.0),
            ])
            .expect("Should add");

        assert_eq!(history.undo_count(), 1);
        history.undo(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_depth_bound_drops_oldest() {
        let mut store = RegionStore::new();
        let mut history = VersionedHistory::with_depth(3);

        for i in 0..5 {
            history.record(&store);
            store
                .add(square_region(i as f32 * 10.0, 5.0), None)
                .expect("Should add");
        }
        assert_eq!(history.undo_count(), 3);
    }
}
