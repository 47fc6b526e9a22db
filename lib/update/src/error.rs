use thiserror::Error;

/// Errors raised while planning or executing a SPARQL update (spec §4.10,
/// §4.11). `rdfsql_engine` maps these onto the shared `EngineError`
/// taxonomy at the facade boundary.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("compiling update WHERE clause: {0}")]
    Compile(#[from] rdfsql_compiler::CompileError),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("unknown graph: {0}")]
    UnknownGraph(String),

    #[error("unbound variable in update template: {0}")]
    UnboundVariable(String),

    /// A graph-management op targeted a graph the security policy doesn't
    /// admit (spec §4.11 "Graph CREATE"/"Graph DROP/CLEAR").
    #[error("graph disallowed by policy: {0}")]
    PolicyViolation(String),

    /// A non-`SILENT` storage operation failed; the caller's `UpdateSink`
    /// surfaced this via its own error type.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub type UpdateResult<T> = Result<T, UpdateError>;

impl From<rdfsql_ontology::OntologyError> for UpdateError {
    fn from(value: rdfsql_ontology::OntologyError) -> Self {
        match value {
            rdfsql_ontology::OntologyError::UnknownClass(c) => Self::UnknownClass(c),
            rdfsql_ontology::OntologyError::UnknownProperty(p) => Self::UnknownProperty(p),
        }
    }
}
