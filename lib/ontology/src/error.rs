use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OntologyError {
    #[error("unknown class: {0}")]
    UnknownClass(String),
    #[error("unknown property: {0}")]
    UnknownProperty(String),
}

pub type OntologyResult<T> = Result<T, OntologyError>;
