use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown class: {0}")]
    UnknownClass(String),
    #[error("unknown property: {0}")]
    UnknownProperty(String),
    #[error("unknown graph: {0}")]
    UnknownGraph(String),
    #[error("variable ?{0} is used but never bound by a preceding pattern")]
    UnboundVariable(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("graph disallowed by policy: {0}")]
    PolicyViolation(String),
}

impl From<rdfsql_ontology::OntologyError> for CompileError {
    fn from(err: rdfsql_ontology::OntologyError) -> Self {
        match err {
            rdfsql_ontology::OntologyError::UnknownClass(iri) => CompileError::UnknownClass(iri),
            rdfsql_ontology::OntologyError::UnknownProperty(iri) => {
                CompileError::UnknownProperty(iri)
            }
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
