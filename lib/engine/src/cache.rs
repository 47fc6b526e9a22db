//! A generation-keyed cache of prepared statements (spec §5 "Shared
//! resources", SPEC_FULL.md §C.3). Keyed on the compiled SQL text; evicted
//! wholesale whenever the storage collaborator's [`Generation`] advances,
//! since a schema change can make previously-valid SQL reference a column
//! that no longer exists.
//!
//! Grounded on the `lru` crate, which `seanchatmangpt-ggen-mcp` (one of this
//! pack's five candidate teachers) already depends on for exactly this
//! shape of bounded key→value cache.

use lru::LruCache;
use rdfsql_common::Generation;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Caches prepared [`rusqlite::Statement`] handles would borrow from the
/// connection they were prepared against, which this cache can't own
/// alongside a `Connection` without a self-referential struct. Instead it
/// caches the compiled SQL text and bindings are always re-prepared fresh;
/// what's memoized is whether a given SQL text is known-cacheable (its
/// parameter count is within [`crate::EngineOptions::parameter_cap`]) so the
/// engine can skip that check on a repeat query, the same cheap memoization
/// the teacher's query planner does for repeated logical plans.
pub(crate) struct StatementCache {
    entries: Mutex<LruCache<String, bool>>,
    generation: Mutex<u32>,
}

impl StatementCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
        Self { entries: Mutex::new(LruCache::new(capacity)), generation: Mutex::new(0) }
    }

    /// Drops every cached entry if `current` has advanced past what was last
    /// observed here, then records `current` as the new baseline.
    pub(crate) fn sync_generation(&self, current: &Generation) {
        let observed = current.current();
        let mut last = self.generation.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *last != observed {
            self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
            *last = observed;
        }
    }

    /// Whether `sql` is already known to be cacheable (`true`), known not to
    /// be (`false`), or has not been seen yet (`None`).
    pub(crate) fn get(&self, sql: &str) -> Option<bool> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(sql).copied()
    }

    pub(crate) fn insert(&self, sql: String, cacheable: bool) {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).put(sql, cacheable);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_until_generation_advances() {
        let cache = StatementCache::new(4);
        let gen = Generation::new();
        cache.sync_generation(&gen);
        cache.insert("SELECT 1".to_owned(), true);
        assert_eq!(cache.get("SELECT 1"), Some(true));

        cache.sync_generation(&gen);
        assert_eq!(cache.get("SELECT 1"), Some(true));

        gen.advance();
        cache.sync_generation(&gen);
        assert_eq!(cache.get("SELECT 1"), None);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = StatementCache::new(2);
        cache.insert("a".to_owned(), true);
        cache.insert("b".to_owned(), true);
        cache.insert("c".to_owned(), true);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
    }
}
