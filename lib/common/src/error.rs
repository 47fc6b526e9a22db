use std::error::Error;
use std::fmt::Debug;
use thiserror::Error;

/// The error kinds that can escape `execute_cursor`/`execute_update` (spec
/// §7). Static errors abort the whole call with the first error found;
/// dynamic errors abort the current call unless the offending update
/// operation is `SILENT`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Syntax error, or an early static check failed (undefined variable in
    /// BIND/DESCRIBE, forbidden construct in a VALUES block, bad LangTag on a
    /// parameter, ...).
    #[error("parse error: {0}")]
    Parse(String),

    /// An expression's operand types did not match what the operator
    /// required, or a required parameter value was not supplied.
    #[error("type error: {0}")]
    Type(String),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("unknown graph: {0}")]
    UnknownGraph(String),

    /// A graph/service access was disallowed by policy, or a graph-creating
    /// operation conflicted with existing state and was not `SILENT`.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The query API was used against an update handle, or vice versa.
    #[error("wrong handle type for this operation")]
    QueryFailed,

    /// An error surfaced verbatim from the SQL engine collaborator.
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn Error + Send + Sync + 'static>),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn internal(error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self::Internal(error.into())
    }
}
