use rdfsql_compiler::CompiledSql;

use crate::term::{UpdateGraph, UpdateTerm};

/// Which of the three storage calls a triple template dispatches to,
/// mirroring the data layer's `insert_statement`/`delete_statement`/
/// `update_statement` split (spec §4.11): a single-valued property is
/// *replaced* rather than appended to, so its INSERT side becomes a
/// `Replace`, while a multi-valued property's INSERT side is a plain
/// `Insert` of a new row. The DELETE side of any property is always
/// `Delete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TripleOpKind {
    Insert,
    Delete,
    Replace,
}

/// One triple-level update operation, still carrying unresolved templates
/// (ground terms or WHERE-cursor variable references) — resolved into a
/// [`crate::term::ResolvedQuad`] per solution row at execution time.
#[derive(Clone, Debug)]
pub struct TripleOp {
    pub kind: TripleOpKind,
    pub subject: UpdateTerm,
    pub predicate: UpdateTerm,
    pub object: UpdateTerm,
    pub graph: UpdateGraph,
}

/// The scope a graph-management operation (`CREATE`/`DROP`/`CLEAR`) applies
/// over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphScope {
    Named(spargebra::term::NamedNode),
    Default,
    AllNamed,
    All,
}

/// A single update operation, one variant per `GraphUpdateOperation` case
/// plus the triple-level ops a `DeleteInsert`/`InsertData`/`DeleteData`
/// decomposes into (spec §4 "Update operations (C10)").
#[derive(Clone, Debug)]
pub enum UpdateOp {
    Triple(TripleOp),
    Load { silent: bool, source: spargebra::term::NamedNode, destination: UpdateGraph },
    Clear { silent: bool, graph: GraphScope },
    Create { silent: bool, graph: spargebra::term::NamedNode },
    Drop { silent: bool, graph: GraphScope },
}

/// A contiguous run of [`TripleOp`]s sharing one WHERE solution set (spec
/// §4.10 "op group"). `InsertData`/`DeleteData` groups have no `select`:
/// their templates are already ground, so they run once with no cursor.
/// Graph-management ops (`Load`/`Clear`/`Create`/`Drop`) are their own
/// one-operation, cursor-less group.
#[derive(Clone, Debug)]
pub struct OpGroup {
    pub ops: Vec<UpdateOp>,
    /// The compiled `WHERE` clause driving this group, one solution row at
    /// a time, if any (`None` for ground data and graph-management ops).
    pub select: Option<CompiledSql>,
}

/// The full ordered plan for one `spargebra::Update`.
#[derive(Clone, Debug, Default)]
pub struct UpdatePlan {
    pub groups: Vec<OpGroup>,
}
