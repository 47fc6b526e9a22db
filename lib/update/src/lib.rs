//! Plans and executes SPARQL 1.1 Update requests against the storage
//! interface `rdfsql_engine` implements (spec §4.10 "Update planner (C10)",
//! §4.11 "Update executor (C11)").
//!
//! [`plan_update`] turns a parsed `spargebra::Update` into an [`UpdatePlan`]
//! of [`OpGroup`]s without touching storage. [`execute_plan`] then drives
//! that plan against an [`UpdateSink`]/[`WhereRunner`] pair the caller
//! supplies — this crate never depends on a concrete SQL engine, mirroring
//! how `rdfsql_compiler` injects an `exists` callback rather than depending
//! on the storage layer directly.

mod bnode;
mod error;
mod executor;
mod op;
mod plan;
mod term;

pub use bnode::BnodeMapper;
pub use error::{UpdateError, UpdateResult};
pub use executor::{execute_plan, ObjectValue, UpdateSink, WhereCursor, WhereRunner};
pub use op::{GraphScope, OpGroup, TripleOp, TripleOpKind, UpdateOp, UpdatePlan};
pub use plan::plan_update;
pub use term::{ResolvedQuad, ResolvedTerm, UpdateGraph, UpdateTerm};
