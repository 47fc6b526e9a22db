//! Binds one [`Binding`] (spec §4.3) at its compiled positional index. Both
//! query execution ([`crate::engine`]) and update WHERE-clause execution
//! ([`crate::storage::SqliteWhereRunner`]) share this, since a compiled
//! WHERE clause's bindings are produced by the very same compiler pass as a
//! top-level query's.

use rdfsql_common::{EngineError, EngineResult};
use rdfsql_compiler::binding::Binding;
use rdfsql_model::Value;
use rusqlite::Connection;
use rustc_hash::FxHashMap;

use crate::value_codec;

/// Binds placeholder `idx` (1-based) of `stmt` from `binding`, resolving a
/// named [`Binding::Parameter`] against `parameters`.
///
/// [`Binding::Variable`] never reaches here in practice — the compiler
/// inlines a variable binding as SQL text at the point it is read rather
/// than ever assigning it a placeholder (see `rdfsql_compiler::context`) —
/// but a defensive error is cheaper than a silent no-op if that ever
/// changes.
pub(crate) fn bind_one(
    conn: &Connection,
    stmt: &mut rusqlite::Statement<'_>,
    idx: usize,
    binding: &Binding,
    parameters: &FxHashMap<String, Value>,
) -> EngineResult<()> {
    match binding {
        Binding::Literal(lit) => value_codec::bind_literal(conn, stmt, idx, &lit.bytes, lit.data_type),
        Binding::Parameter(param) => {
            let value = parameters
                .get(&param.name)
                .ok_or_else(|| EngineError::Type(format!("missing value for parameter ${}", param.name)))?;
            value_codec::bind_value(stmt, idx, value)
        }
        Binding::Variable(_) => Err(EngineError::internal(std::io::Error::other(
            "a Binding::Variable reached the positional bindings array; the compiler should have inlined it",
        ))),
    }
}
