//! Folder hierarchy checks
//!
//! Concurrent moves on different devices can each be valid on their own and
//! still combine into a cycle (A moved into B on one device, B moved into A
//! on another). The tree answers whether a placement would close such a
//! loop; the resolver then falls back to the root.

use std::collections::{HashMap, HashSet};

use notesync_core::domain::ItemId;

use crate::error::ConflictError;

/// Parent links of every live folder
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    parents: HashMap<ItemId, Option<ItemId>>,
}

impl FolderTree {
    /// Builds the tree, rejecting one that already contains a cycle
    ///
    /// # Errors
    ///
    /// Returns `ConflictError::CorruptTree` naming a folder on the cycle.
    pub fn new(parents: HashMap<ItemId, Option<ItemId>>) -> Result<Self, ConflictError> {
        let tree = Self { parents };
        tree.check_acyclic()?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.parents.contains_key(id)
    }

    fn check_acyclic(&self) -> Result<(), ConflictError> {
        let mut verified: HashSet<&ItemId> = HashSet::new();
        for start in self.parents.keys() {
            let mut path: HashSet<&ItemId> = HashSet::new();
            let mut current = Some(start);
            while let Some(id) = current {
                if verified.contains(id) {
                    break;
                }
                if !path.insert(id) {
                    return Err(ConflictError::CorruptTree(id.clone()));
                }
                current = self.parents.get(id).and_then(Option::as_ref);
            }
            verified.extend(path);
        }
        Ok(())
    }

    /// True if placing `folder` under `new_parent` makes it its own ancestor
    ///
    /// Parents that are not known folders end the walk, as does the root.
    pub fn would_create_cycle(&self, folder: &ItemId, new_parent: Option<&ItemId>) -> bool {
        let mut current = new_parent;
        let mut steps = 0usize;
        while let Some(id) = current {
            if id == folder {
                return true;
            }
            steps += 1;
            if steps > self.parents.len() {
                // Only reachable through a pre-existing loop
                return true;
            }
            current = self.parents.get(id).and_then(Option::as_ref);
        }
        false
    }

    /// Records a folder's placement after it has been applied
    pub fn set_parent(&mut self, folder: ItemId, parent: Option<ItemId>) {
        self.parents.insert(folder, parent);
    }

    pub fn remove(&mut self, folder: &ItemId) {
        self.parents.remove(folder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [ItemId; N] {
        std::array::from_fn(|_| ItemId::generate())
    }

    #[test]
    fn accepts_forest() {
        let [a, b, c] = ids();
        let tree = FolderTree::new(HashMap::from([
            (a.clone(), None),
            (b.clone(), Some(a.clone())),
            (c.clone(), Some(b.clone())),
        ]))
        .unwrap();
        assert_eq!(tree.len(), 3);
        assert!(!tree.would_create_cycle(&c, Some(&a)));
    }

    #[test]
    fn rejects_existing_cycle() {
        let [a, b] = ids();
        let result = FolderTree::new(HashMap::from([
            (a.clone(), Some(b.clone())),
            (b.clone(), Some(a.clone())),
        ]));
        assert!(matches!(result, Err(ConflictError::CorruptTree(_))));
    }

    #[test]
    fn rejects_self_parent() {
        let [a] = ids();
        let result = FolderTree::new(HashMap::from([(a.clone(), Some(a.clone()))]));
        assert!(result.is_err());
    }

    #[test]
    fn detects_cycle_from_concurrent_moves() {
        // Device 1 moved A under B; device 2 moved B under A
        let [a, b] = ids();
        let tree = FolderTree::new(HashMap::from([
            (a.clone(), Some(b.clone())),
            (b.clone(), None),
        ]))
        .unwrap();
        assert!(tree.would_create_cycle(&b, Some(&a)));
        assert!(tree.would_create_cycle(&a, Some(&a)));
        assert!(!tree.would_create_cycle(&b, None));
    }

    #[test]
    fn unknown_parent_ends_walk() {
        let [a, unknown] = ids();
        let tree = FolderTree::new(HashMap::from([(a.clone(), None)])).unwrap();
        assert!(!tree.would_create_cycle(&a, Some(&unknown)));
    }

    #[test]
    fn updates_track_applied_moves() {
        let [a, b] = ids();
        let mut tree = FolderTree::default();
        tree.set_parent(a.clone(), None);
        tree.set_parent(b.clone(), Some(a.clone()));
        assert!(tree.would_create_cycle(&a, Some(&b)));

        tree.remove(&b);
        assert!(!tree.contains(&b));
        assert!(!tree.would_create_cycle(&a, Some(&b)));
    }
}
