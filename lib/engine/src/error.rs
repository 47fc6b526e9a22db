use rdfsql_common::EngineError;

/// Maps a `rusqlite` failure onto the shared [`EngineError`] taxonomy (spec
/// §7): constraint violations surface as [`EngineError::ConstraintViolation`],
/// everything else is wrapped as [`EngineError::Internal`].
pub(crate) fn from_rusqlite(error: rusqlite::Error) -> EngineError {
    match &error {
        rusqlite::Error::SqliteFailure(sqlite_error, _)
            if sqlite_error.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EngineError::ConstraintViolation(error.to_string())
        }
        _ => EngineError::internal(error),
    }
}

pub(crate) fn from_compile(error: rdfsql_compiler::CompileError) -> EngineError {
    use rdfsql_compiler::CompileError;
    match error {
        CompileError::UnknownClass(c) => EngineError::UnknownClass(c),
        CompileError::UnknownProperty(p) => EngineError::UnknownProperty(p),
        CompileError::UnknownGraph(g) => EngineError::UnknownGraph(g),
        CompileError::Type(t) => EngineError::Type(t),
        CompileError::UnboundVariable(_) | CompileError::Unsupported(_) => {
            EngineError::Parse(error.to_string())
        }
        CompileError::PolicyViolation(g) => EngineError::ConstraintViolation(g),
    }
}

pub(crate) fn from_update(error: rdfsql_update::UpdateError) -> EngineError {
    match error {
        rdfsql_update::UpdateError::Compile(e) => from_compile(e),
        rdfsql_update::UpdateError::UnknownClass(c) => EngineError::UnknownClass(c),
        rdfsql_update::UpdateError::UnknownProperty(p) => EngineError::UnknownProperty(p),
        rdfsql_update::UpdateError::UnknownGraph(g) => EngineError::UnknownGraph(g),
        rdfsql_update::UpdateError::UnboundVariable(v) => EngineError::Type(v),
        rdfsql_update::UpdateError::PolicyViolation(g) => EngineError::ConstraintViolation(g),
        rdfsql_update::UpdateError::Storage(e) => EngineError::Internal(e),
    }
}
