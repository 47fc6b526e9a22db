//! Bindings: what a [`crate::token::Token::Variable`] or bound literal
//! resolves to once it has been anchored to a concrete SQL expression (spec
//! §3 "Data tables" / §4.3 "Bindings").

use rdfsql_model::{NamedNode, RdfTermType, Variable};

/// A literal value that has been assigned a parameter placeholder in the
/// enclosing query's ordered bindings array.
#[derive(Clone, Debug)]
pub struct LiteralBinding {
    pub bytes: Vec<u8>,
    pub data_type: RdfTermType,
    /// The `?N` placeholder text this literal was assigned when it was
    /// appended to the root `SELECT` context's bindings array.
    pub placeholder: String,
}

/// An update parameter: a literal binding named rather than positional, so
/// the same compiled update can be re-run with different values.
#[derive(Clone, Debug)]
pub struct ParameterBinding {
    pub name: String,
    pub placeholder: String,
}

/// A SPARQL variable resolved to the SQL column currently holding its
/// value, plus enough type information to compile comparisons and casts
/// against it without re-deriving them from the schema each time.
#[derive(Clone, Debug)]
pub struct VariableBinding {
    pub variable: Variable,
    pub class: Option<NamedNode>,
    /// Query-local table alias (e.g. `t3`), distinct from the underlying
    /// schema table name.
    pub sql_query_tablename: String,
    pub sql_db_column_name: String,
    pub data_type: RdfTermType,
    pub nullable: bool,
}

impl VariableBinding {
    /// The qualified column reference to use when this variable is read.
    pub fn sql_expression(&self) -> String {
        format!("\"{}\".\"{}\"", self.sql_query_tablename, self.sql_db_column_name)
    }
}

/// Any of the three kinds of value a query expression can resolve to.
#[derive(Clone, Debug)]
pub enum Binding {
    Literal(LiteralBinding),
    Parameter(ParameterBinding),
    Variable(VariableBinding),
}

impl Binding {
    pub fn data_type(&self) -> RdfTermType {
        match self {
            Binding::Literal(lit) => lit.data_type,
            Binding::Parameter(_) => RdfTermType::Unknown,
            Binding::Variable(var) => var.data_type,
        }
    }

    /// The SQL text to splice in wherever this binding's value is read.
    pub fn sql_expression(&self) -> String {
        match self {
            Binding::Literal(lit) => lit.placeholder.clone(),
            Binding::Parameter(param) => param.placeholder.clone(),
            Binding::Variable(var) => var.sql_expression(),
        }
    }
}
