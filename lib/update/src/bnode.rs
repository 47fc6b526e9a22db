use rdfsql_common::{BlankNodeMappingMode, RowId};
use rustc_hash::FxHashMap;

use crate::error::{UpdateError, UpdateResult};

/// Resolves labelled blank nodes (`_:name`) in an update's INSERT/DELETE
/// templates to storage row ids, per spec §4.11 "Blank-node mapping rules".
/// Carries the caller's `bnode_map_in`/`bnodes_out` across the whole update,
/// so the same label maps to the same row id in every op group.
pub struct BnodeMapper {
    mode: BlankNodeMappingMode,
    map: FxHashMap<String, RowId>,
    fresh: Vec<(String, RowId)>,
}

impl BnodeMapper {
    pub fn new(mode: BlankNodeMappingMode, map_in: FxHashMap<String, RowId>) -> Self {
        Self { mode, map: map_in, fresh: Vec::new() }
    }

    /// Resolves `label`, allocating a fresh row id on first use unless the
    /// mapper is in `RequireMapped` mode.
    pub fn resolve(&mut self, label: &str, allocate: impl FnOnce() -> UpdateResult<RowId>) -> UpdateResult<RowId> {
        if let Some(id) = self.map.get(label) {
            return Ok(*id);
        }
        match self.mode {
            BlankNodeMappingMode::RequireMapped => {
                Err(UpdateError::UnboundVariable(format!("blank node _:{label} not present in bnode_map_in")))
            }
            BlankNodeMappingMode::MapAndAllocate => {
                let id = allocate()?;
                self.map.insert(label.to_owned(), id);
                self.fresh.push((label.to_owned(), id));
                Ok(id)
            }
        }
    }

    /// The `label -> rowid` pairs newly allocated by this update, in
    /// first-use order — the payload of the `bnodes_out` report (spec §6
    /// Update API).
    pub fn fresh_bindings(&self) -> &[(String, RowId)] {
        &self.fresh
    }

    pub fn into_map(self) -> FxHashMap<String, RowId> {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_allocates_and_records_fresh_binding() {
        let mut mapper = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        let id = mapper.resolve("a", || Ok(RowId::new(7))).expect("allocates");
        assert_eq!(id, RowId::new(7));
        assert_eq!(mapper.fresh_bindings(), &[("a".to_owned(), RowId::new(7))]);
    }

    #[test]
    fn repeated_use_returns_the_same_row_id() {
        let mut mapper = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        let first = mapper.resolve("a", || Ok(RowId::new(7))).expect("allocates");
        let second = mapper.resolve("a", || Ok(RowId::new(999))).expect("reuses");
        assert_eq!(first, second);
        assert_eq!(mapper.fresh_bindings().len(), 1);
    }

    #[test]
    fn require_mapped_rejects_unknown_labels() {
        let mut mapper = BnodeMapper::new(BlankNodeMappingMode::RequireMapped, FxHashMap::default());
        let err = mapper.resolve("a", || Ok(RowId::new(1))).expect_err("must fail");
        assert!(matches!(err, UpdateError::UnboundVariable(_)));
    }
}
