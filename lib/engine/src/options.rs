/// Configuration read back from the `metadata(key,value)` table at
/// [`crate::SparqlEngine::open`] (spec §6 "Persisted metadata"), plus the
/// handful of engine-side tunables spec §5 mentions, grouped the way the
/// teacher groups its `QueryOptions`/engine-builder knobs rather than
/// reading from a global.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// `TRACKER` collation locale, e.g. `"en_US.UTF-8"`.
    pub locale: String,
    /// Whether the full-text search extension (spec §1) is enabled for this
    /// database.
    pub fts_enabled: bool,
    /// Upper bound on distinct `?N` literal bindings a compiled statement
    /// may carry before the per-interface LRU refuses to cache it (spec §5
    /// "Shared resources").
    pub parameter_cap: usize,
    /// Capacity of the generation-keyed prepared-statement cache (spec §5).
    pub statement_cache_size: usize,
    /// The security policy's graph superset (spec §4.6 `policy.graphs`):
    /// `None` leaves every graph readable/writable, `Some` bounds the engine
    /// to exactly those graph IRIs for the lifetime of this open database
    /// handle.
    pub policy_graphs: Option<Vec<String>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            locale: "C".to_owned(),
            fts_enabled: false,
            parameter_cap: 999,
            statement_cache_size: 128,
            policy_graphs: None,
        }
    }
}
