//! Position ledger: the processed-once set behind initial SL/TP assignment
//!
//! A position id enters the set the first tick its initial stop/target has
//! been dealt with and leaves it when the host reports the position closed.
//! Until then the convergence step never looks at that id again, so a later
//! break-even or trailing adjustment is never overwritten by the initial
//! levels.

use std::collections::HashSet;

use crate::types::{Position, PositionId};

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    processed: HashSet<PositionId>,
    open_count: usize,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, id: PositionId) -> bool {
        self.processed.contains(&id)
    }

    /// Record that the initial assignment for `id` was handled. Re-marking is a no-op.
    pub fn mark_processed(&mut self, id: PositionId) {
        self.processed.insert(id);
    }

    /// Forget `id` after the host closed it. Safe to call for unknown ids.
    pub fn on_closed(&mut self, id: PositionId) -> bool {
        self.processed.remove(&id)
    }

    /// Positions that still need their initial SL/TP pass
    pub fn unverified<'a>(
        &'a self,
        positions: &'a [Position],
    ) -> impl Iterator<Item = &'a Position> + 'a {
        positions.iter().filter(move |p| !self.is_processed(p.id))
    }

    /// Remember how many positions were open on the last observed tick
    pub fn observe(&mut self, positions: &[Position]) {
        self.open_count = positions.len();
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    #[cfg(test)]
    fn processed_len(&self) -> usize {
        self.processed.len()
    }
}
