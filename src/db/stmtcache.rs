/*
 * Created on Wed Jan 24 2024
 *
 * This file is a part of qmd
 * qmd is the query manager that fronts the game world, login and web
 * services with a typed query protocol over a shared SQL store.
 *
 * Copyright (c) 2024, The qmd developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The per-session statement cache
//!
//! Each worker session keeps an LRU of prepared statements keyed by the
//! exact SQL text (case-sensitive). A hash of the text skips the string
//! compare on most probes; a collision falls back to the full comparison.
//! Eviction picks the slot with the oldest use stamp and hands the evicted
//! backend handle back to the caller so the server-side statement can be
//! released. Losing the session discards the whole cache.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// The hard ceiling on the configured capacity. A configuration above this
/// is clamped (with a warning at evaluation time): the cache must stay
/// bounded no matter what the config says.
pub const STATEMENT_CACHE_CEILING: usize = 9999;

#[derive(Debug)]
struct Slot<T> {
    hash: u64,
    sql: String,
    stamp: u64,
    stmt: T,
}

/// An LRU of prepared statements, generic over the backend handle type
#[derive(Debug)]
pub struct StatementCache<T> {
    slots: Vec<Slot<T>>,
    capacity: usize,
    clock: u64,
}

fn hash_sql(sql: &str) -> u64 {
    let mut h = DefaultHasher::new();
    sql.hash(&mut h);
    h.finish()
}

impl<T> StatementCache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, STATEMENT_CACHE_CEILING);
        Self {
            slots: Vec::with_capacity(capacity.min(64)),
            capacity,
            clock: 0,
        }
    }
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
    /// Look the SQL text up; a hit refreshes the use stamp
    pub fn lookup(&mut self, sql: &str) -> Option<&T> {
        let hash = hash_sql(sql);
        let stamp = self.tick();
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.hash == hash && s.sql == sql)?;
        slot.stamp = stamp;
        Some(&slot.stmt)
    }
    /// Store a freshly prepared statement, evicting the least recently
    /// used slot when full. The evicted handle is returned so the caller
    /// can release the server-side statement.
    pub fn insert(&mut self, sql: &str, stmt: T) -> Option<T> {
        let hash = hash_sql(sql);
        let stamp = self.tick();
        let slot = Slot {
            hash,
            sql: sql.to_owned(),
            stamp,
            stmt,
        };
        if self.slots.len() < self.capacity {
            self.slots.push(slot);
            return None;
        }
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.stamp)
            .map(|(i, _)| i)?;
        let evicted = std::mem::replace(&mut self.slots[oldest], slot);
        Some(evicted.stmt)
    }
    /// Discard everything; used on session loss and teardown
    pub fn clear(&mut self) -> Vec<T> {
        self.slots.drain(..).map(|s| s.stmt).collect()
    }
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_refreshes_and_returns_same_handle() {
        let mut cache: StatementCache<u32> = StatementCache::new(4);
        assert!(cache.insert("SELECT 1", 100).is_none());
        assert_eq!(cache.lookup("SELECT 1"), Some(&100));
        // same text, case-sensitive
        assert_eq!(cache.lookup("select 1"), None);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache: StatementCache<usize> = StatementCache::new(3);
        for i in 0..32 {
            cache.insert(&format!("SELECT {i}"), i);
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn eviction_is_lru_and_returns_the_evicted_handle() {
        let mut cache: StatementCache<u32> = StatementCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // touch "a" so "b" becomes the oldest
        assert!(cache.lookup("a").is_some());
        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(2));
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("c").is_some());
    }

    #[test]
    fn clear_simulates_session_reset() {
        let mut cache: StatementCache<u32> = StatementCache::new(4);
        cache.insert("a", 1);
        cache.insert("b", 2);
        let dropped = cache.clear();
        assert_eq!(dropped.len(), 2);
        // the next probe is a miss
        assert!(cache.lookup("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn absurd_capacity_is_clamped() {
        let cache: StatementCache<u32> = StatementCache::new(1_000_000);
        assert_eq!(cache.capacity(), STATEMENT_CACHE_CEILING);
        let cache: StatementCache<u32> = StatementCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
