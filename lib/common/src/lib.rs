//! Shared types used across the compiler, update executor and engine crates:
//! the row-identifier newtype, the schema `generation` counter, blank-node
//! handling modes, and the top-level error taxonomy (spec §7).

mod blank_node_mode;
mod error;
mod generation;
mod row_id;

pub use blank_node_mode::BlankNodeMappingMode;
pub use error::{EngineError, EngineResult};
pub use generation::Generation;
pub use row_id::RowId;
