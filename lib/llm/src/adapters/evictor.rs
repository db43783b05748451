// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::time::Instant;

/// Ordering key for eviction: least recently accessed first, then earliest inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Recency {
    pub last_access: Instant,
    pub seq: u64,
}

/// Tracks evictable keys in least-recently-used order
#[derive(Debug)]
pub struct LRUEvictor<T: Clone + Eq + Hash + Ord> {
    free_table: HashMap<T, Recency>,
    priority_queue: BTreeSet<(Recency, T)>,
}

impl<T: Clone + Eq + Hash + Ord> Default for LRUEvictor<T> {
    fn default() -> Self {
        Self {
            free_table: HashMap::new(),
            priority_queue: BTreeSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash + Ord> LRUEvictor<T> {
    /// Make `key` evictable at `recency`, replacing any earlier position
    pub fn insert(&mut self, key: T, recency: Recency) {
        if let Some(old) = self.free_table.insert(key.clone(), recency) {
            self.priority_queue.remove(&(old, key.clone()));
        }
        self.priority_queue.insert((recency, key));
    }

    /// Returns true if the key was evictable
    pub fn remove(&mut self, key: &T) -> bool {
        let Some(recency) = self.free_table.remove(key) else {
            return false;
        };
        self.priority_queue.remove(&(recency, key.clone()));
        true
    }

    /// Pop the least recently used key
    pub fn evict(&mut self) -> Option<T> {
        let (_, key) = self.priority_queue.pop_first()?;
        self.free_table.remove(&key);
        Some(key)
    }

    pub fn contains(&self, key: &T) -> bool {
        self.free_table.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.free_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free_table.is_empty()
    }

    /// Keys in eviction order
    pub fn keys(&self) -> impl Iterator<Item = &T> {
        self.priority_queue.iter().map(|(_, key)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, ms: u64, seq: u64) -> Recency {
        Recency {
            last_access: base + Duration::from_millis(ms),
            seq,
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let base = Instant::now();
        let mut evictor = LRUEvictor::default();
        evictor.insert("b", at(base, 20, 1));
        evictor.insert("a", at(base, 10, 0));
        evictor.insert("c", at(base, 30, 2));

        assert_eq!(evictor.keys().copied().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(evictor.evict(), Some("a"));
        assert_eq!(evictor.evict(), Some("b"));
        assert_eq!(evictor.len(), 1);
    }

    #[test]
    fn test_ties_break_on_insertion_order() {
        let base = Instant::now();
        let mut evictor = LRUEvictor::default();
        evictor.insert("late", at(base, 5, 9));
        evictor.insert("early", at(base, 5, 3));
        assert_eq!(evictor.evict(), Some("early"));
    }

    #[test]
    fn test_reinsert_moves_key() {
        let base = Instant::now();
        let mut evictor = LRUEvictor::default();
        evictor.insert("a", at(base, 1, 0));
        evictor.insert("b", at(base, 2, 1));
        evictor.insert("a", at(base, 3, 0));
        assert_eq!(evictor.len(), 2);
        assert_eq!(evictor.evict(), Some("b"));

        assert!(evictor.remove(&"a"));
        assert!(!evictor.remove(&"a"));
        assert!(evictor.is_empty());
        assert_eq!(evictor.evict(), None);
    }
}
