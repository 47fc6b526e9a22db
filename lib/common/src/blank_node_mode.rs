/// How blank-node labels in a query or update are resolved against the
/// caller-supplied `bnode_map_in` (spec §6 Update API, §4.11 mapping rules).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BlankNodeMappingMode {
    /// Labelled blank nodes (`_:name`) are looked up in the caller's map and,
    /// on first use, allocated a fresh row id that is recorded back into the
    /// map and (optionally) the `bnodes_out` report.
    #[default]
    MapAndAllocate,
    /// Labelled blank nodes must already be present in the caller's map;
    /// encountering an unknown label is an error. Used when replaying an
    /// update whose bnode mapping was already fixed by a previous execution.
    RequireMapped,
}
