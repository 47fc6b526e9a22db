use std::sync::atomic::{AtomicU32, Ordering};

/// A monotone counter the storage layer advances whenever the ontology or
/// schema changes. The compiler uses it to invalidate cached compilations
/// (spec §5 "Shared resources").
#[derive(Debug, Default)]
pub struct Generation(AtomicU32);

impl Generation {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn current(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}
