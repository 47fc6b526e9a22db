//! A `rusqlite`-backed SQL engine and storage collaborator for
//! `rdfsql_compiler`/`rdfsql_update` (spec §6): the `SparqlEngine` facade
//! ties the compiler, the update planner/executor and a concrete SQLite
//! schema together into the one object an application actually opens.

mod binder;
mod cache;
mod engine;
mod error;
mod functions;
mod options;
mod resource_cache;
mod storage;
mod value_codec;

pub use engine::{Cursor, QueryHandle, SparqlEngine, UpdateHandle};
pub use options::EngineOptions;
pub use storage::SqliteStorage;
