//! An in-memory IRI↔row-id intern table, shared between [`crate::storage`]
//! and the registered `sparql_*` scalar functions in [`crate::functions`].
//!
//! `rusqlite`'s [`rusqlite::functions::Context`] gives a scalar function no
//! way back to the [`rusqlite::Connection`] that is currently executing it,
//! so a function body can't simply run `SELECT iri FROM resources WHERE
//! id = ?` while a statement over that same connection is mid-step. The
//! teacher's own storage layer (`lib/storage/src/memory/storage/index`)
//! already keeps its indices behind `Arc<Mutex<_>>` rather than re-querying a
//! backing store for every lookup; this cache follows the same shape, kept
//! current by every [`crate::storage::SqliteStorage`] write path
//! (`ensure_resource`, `allocate_blank_node`) so that by the time a function
//! runs, the id it was handed is already interned here.

use std::sync::{Arc, Mutex};

use rdfsql_common::RowId;
use rustc_hash::FxHashMap;

#[derive(Default)]
struct Inner {
    by_id: FxHashMap<i64, Option<String>>,
    by_iri: FxHashMap<String, i64>,
}

/// A cheaply cloneable handle onto the shared intern table.
#[derive(Clone, Default)]
pub struct ResourceCache(Arc<Mutex<Inner>>);

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `id` prints as `iri`, or as `urn:bnode:<id>` when `iri`
    /// is `None`.
    pub fn insert(&self, id: RowId, iri: Option<&str>) {
        let mut inner = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_id.insert(id.get(), iri.map(str::to_owned));
        if let Some(iri) = iri {
            inner.by_iri.insert(iri.to_owned(), id.get());
        }
    }

    /// The printed form of `id`, if it has been interned.
    pub fn iri_for(&self, id: RowId) -> Option<String> {
        let inner = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.by_id.get(&id.get()) {
            Some(Some(iri)) => Some(iri.clone()),
            Some(None) => Some(format!("urn:bnode:{}", id.get())),
            None => None,
        }
    }

    /// The row id `iri` is interned as, if any.
    pub fn id_for(&self, iri: &str) -> Option<RowId> {
        let inner = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_iri.get(iri).copied().map(RowId::new)
    }

    /// Whether `id` was allocated with no interned IRI (a blank node).
    pub fn is_blank(&self, id: RowId) -> bool {
        let inner = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        matches!(inner.by_id.get(&id.get()), Some(None))
    }

    /// Loads every existing `resources` row, run once from
    /// [`crate::engine::SparqlEngine::open`] before the cache is handed to
    /// registered functions.
    pub fn preload(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare("SELECT id, iri FROM resources")?;
        let mut rows = stmt.query([])?;
        let mut inner = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let iri: Option<String> = row.get(1)?;
            if let Some(iri) = &iri {
                inner.by_iri.insert(iri.clone(), id);
            }
            inner.by_id.insert(id, iri);
        }
        Ok(())
    }
}
