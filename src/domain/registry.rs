//! Entity Registry
//!
//! De-duplicated set of every token and wallet the harvester has seen.
//! Shared by reference between jobs and the fan-out; first registration
//! wins and later registrations of the same ref are no-ops.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::entity::{EntityId, EntityKind, EntityRef};

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: RwLock<HashMap<EntityRef, DateTime<Utc>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the ref if absent. Returns true only for the caller that
    /// actually inserted it.
    pub fn register(&self, entity: &EntityRef) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(entity) {
            return false;
        }
        entries.insert(entity.clone(), Utc::now());
        true
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the ref was first registered
    pub fn seen_at(&self, entity: &EntityRef) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .copied()
    }

    /// Sorted ids of one kind, copied out so callers never hold the lock
    pub fn snapshot(&self, kind: EntityKind) -> Vec<EntityId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<EntityId> = entries
            .keys()
            .filter(|r| r.kind == kind)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Register configured refs up front; returns how many were new
    pub fn seed<I>(&self, refs: I) -> usize
    where
        I: IntoIterator<Item = EntityRef>,
    {
        refs.into_iter().filter(|r| self.register(r)).count()
    }

    /// Drop entries first seen longer than `age` ago; returns how many went
    pub fn prune_older_than(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, seen_at| *seen_at >= cutoff);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn token(id: &str) -> EntityRef {
        EntityRef::token(EntityId::new(id))
    }

    #[test]
    fn test_register_is_first_wins() {
        let registry = EntityRegistry::new();
        assert!(registry.register(&token("a")));
        assert!(!registry.register(&token("a")));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&token("a")));
    }

    #[test]
    fn test_kinds_are_distinct() {
        let registry = EntityRegistry::new();
        let id = EntityId::new("same");
        assert!(registry.register(&EntityRef::token(id.clone())));
        assert!(registry.register(&EntityRef::wallet(id)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_snapshot_filters_and_sorts() {
        let registry = EntityRegistry::new();
        registry.register(&token("c"));
        registry.register(&token("a"));
        registry.register(&EntityRef::wallet(EntityId::new("b")));

        let tokens = registry.snapshot(EntityKind::Token);
        assert_eq!(tokens, vec![EntityId::new("a"), EntityId::new("c")]);
        assert_eq!(registry.snapshot(EntityKind::Wallet).len(), 1);
    }

    #[test]
    fn test_seed_counts_new_refs() {
        let registry = EntityRegistry::new();
        registry.register(&token("a"));
        let added = registry.seed(vec![token("a"), token("b")]);
        assert_eq!(added, 1);
    }

    #[test]
    fn test_prune_keeps_recent_entries() {
        let registry = EntityRegistry::new();
        registry.register(&token("a"));
        assert_eq!(registry.prune_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_register_single_winner() {
        let registry = Arc::new(EntityRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(&token("contested")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
