//! Data tables: one entry per table reference a triple block pulls into its
//! `FROM` clause (spec §3 "Data tables", §4.6 "Compile a triple block").

use rdfsql_model::{GraphName, Variable};

use crate::path::PathElementId;

/// A single table (or property-path derived table) joined into a triple
/// block's `FROM` clause.
#[derive(Clone, Debug)]
pub struct DataTable {
    pub graph: Option<GraphName>,
    /// Name of the schema table (or `tracker_triples`) this reference
    /// scans.
    pub sql_db_tablename: String,
    /// Unique alias assigned within the compiling query (`t1`, `t2`, ...).
    pub sql_query_tablename: String,
    /// Set when the predicate itself is unbound, so the generic triples
    /// relation has to be scanned rather than a single property table.
    pub predicate_variable: Option<Variable>,
    /// Set when the object slot of this pattern is a property path rather
    /// than a plain predicate.
    pub predicate_path: Option<PathElementId>,
    /// Whether this reference came from a `tracker:fts:match` filter and so
    /// should join against the full-text index rather than a value column.
    pub fts: bool,
}

impl DataTable {
    pub fn new(sql_db_tablename: impl Into<String>, sql_query_tablename: impl Into<String>) -> Self {
        Self {
            graph: None,
            sql_db_tablename: sql_db_tablename.into(),
            sql_query_tablename: sql_query_tablename.into(),
            predicate_variable: None,
            predicate_path: None,
            fts: false,
        }
    }

    pub fn with_graph(mut self, graph: GraphName) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_predicate_variable(mut self, var: Variable) -> Self {
        self.predicate_variable = Some(var);
        self
    }

    pub fn with_predicate_path(mut self, path: PathElementId) -> Self {
        self.predicate_path = Some(path);
        self
    }

    pub fn with_fts(mut self, fts: bool) -> Self {
        self.fts = fts;
        self
    }

    /// `"table" AS "alias"` text for a `FROM`/`JOIN` clause.
    pub fn sql_from_fragment(&self) -> String {
        format!("\"{}\" AS \"{}\"", self.sql_db_tablename, self.sql_query_tablename)
    }
}
