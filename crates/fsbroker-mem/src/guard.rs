//! Byte budget + RAII guard.
//!
//! Allocate only after acquiring a guard. Dropping the guard returns its bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fsbroker_core::budget::{BudgetGuard, MemoryBudget};

struct Ledger {
    capacity: usize,
    used: AtomicUsize,
}

impl Ledger {
    fn reserve(&self, bytes: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                let next = cur.checked_add(bytes)?;
                (next <= self.capacity).then_some(next)
            })
            .is_ok()
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Shared byte ceiling. Cloning shares the same ledger.
#[derive(Clone)]
pub struct ByteBudget {
    ledger: Arc<Ledger>,
}

impl ByteBudget {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// A budget that only counts; it never refuses.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn used_bytes(&self) -> usize {
        self.ledger.used.load(Ordering::Relaxed)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.ledger.capacity
    }

    fn guard(&self, bytes: usize, tag: &'static str) -> ByteGuard {
        ByteGuard {
            ledger: Arc::clone(&self.ledger),
            bytes,
            tag,
        }
    }
}

impl std::fmt::Debug for ByteBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBudget")
            .field("capacity", &self.capacity_bytes())
            .field("used", &self.used_bytes())
            .finish()
    }
}

/// Bytes held against a [`ByteBudget`].
pub struct ByteGuard {
    ledger: Arc<Ledger>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for ByteGuard {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.ledger.release(self.bytes);
            self.bytes = 0;
        }
    }
}

impl BudgetGuard for ByteGuard {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl ByteGuard {
    /// Resize the held amount. Shrinking always succeeds; growing fails if the
    /// budget cannot cover the difference.
    pub fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes <= self.bytes {
            self.ledger.release(self.bytes - new_bytes);
            self.bytes = new_bytes;
            return true;
        }
        if self.ledger.reserve(new_bytes - self.bytes) {
            self.bytes = new_bytes;
            true
        } else {
            false
        }
    }
}

impl MemoryBudget for ByteBudget {
    type Guard = ByteGuard;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        if bytes == 0 || self.ledger.reserve(bytes) {
            Some(self.guard(bytes, tag))
        } else {
            None
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.ledger.capacity
    }

    fn used_bytes(&self) -> usize {
        self.ledger.used.load(Ordering::Relaxed)
    }
}
