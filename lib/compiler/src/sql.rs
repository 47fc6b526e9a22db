//! The compiler's final output: SQL text plus everything the engine needs
//! to bind it and decode the rows it returns (spec §6 "Query API").

use rdfsql_model::{RdfTermType, Variable};

use crate::binding::Binding;

/// One result-set column: the variable it projects and the RDF type tag
/// needed to decode its raw SQL value back into a term.
#[derive(Clone, Debug)]
pub struct ProjectedColumn {
    pub variable: Variable,
    pub data_type: RdfTermType,
}

/// A fully compiled, parameterized SQL statement ready to hand to a SQL
/// engine collaborator.
#[derive(Clone, Debug)]
pub struct CompiledSql {
    pub text: String,
    /// Positional `?N` bindings, already in the order the placeholders
    /// appear.
    pub bindings: Vec<Binding>,
    pub columns: Vec<ProjectedColumn>,
}

impl CompiledSql {
    pub fn new(text: String, bindings: Vec<Binding>, columns: Vec<ProjectedColumn>) -> Self {
        Self { text, bindings, columns }
    }
}
