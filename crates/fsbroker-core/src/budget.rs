//! Memory budget interfaces for response payloads and arena pages.
//!
//! The concrete implementation lives in `fsbroker-mem`. Only traits live here so
//! the client can name them without pulling in the allocator.

/// Bytes held against a budget. Releases them when dropped.
pub trait BudgetGuard: Send {
    fn bytes(&self) -> usize;
    /// Debug tag for tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A byte ceiling shared by everything that buffers response data.
///
/// Callers acquire before allocating. `None` means the ceiling would be crossed
/// and the allocation must be refused.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    fn capacity_bytes(&self) -> usize;

    /// Approximate bytes in use (advisory).
    fn used_bytes(&self) -> usize;
}
