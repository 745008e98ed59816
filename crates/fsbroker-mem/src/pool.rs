//! Fallible payload buffers accounted against a [`ByteBudget`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use fsbroker_core::budget::{BudgetGuard, MemoryBudget};

use crate::error::{Error, Result};
use crate::guard::{ByteBudget, ByteGuard};
use crate::tracking::PeakTracker;

/// Byte buffer that returns its accounted bytes on drop.
pub struct OwnedBuf {
    guard: ByteGuard,
    buf: Vec<u8>,
}

impl OwnedBuf {
    /// A zeroed buffer of `len` bytes, accounted against `budget`.
    pub fn zeroed(budget: &ByteBudget, len: usize, tag: &'static str) -> Result<Self> {
        let guard = acquire(budget, len, tag)?;
        Ok(Self {
            guard,
            buf: vec![0u8; len],
        })
    }

    /// A buffer holding a copy of `bytes`.
    pub fn copy_from(budget: &ByteBudget, bytes: &[u8], tag: &'static str) -> Result<Self> {
        let guard = acquire(budget, bytes.len(), tag)?;
        Ok(Self {
            guard,
            buf: bytes.to_vec(),
        })
    }

    /// Shorten the buffer and give the cut bytes back to the budget.
    pub fn truncate(&mut self, len: usize) {
        if len < self.buf.len() {
            self.buf.truncate(len);
            self.buf.shrink_to_fit();
            self.guard.try_resize(len);
        }
    }

    pub fn accounted_bytes(&self) -> usize {
        self.guard.bytes()
    }

    pub fn tag(&self) -> &'static str {
        self.guard.tag()
    }
}

fn acquire(budget: &ByteBudget, len: usize, tag: &'static str) -> Result<ByteGuard> {
    budget
        .try_acquire(len, tag)
        .ok_or_else(|| Error::BudgetExceeded {
            tag,
            requested: len,
            capacity: budget.capacity_bytes(),
            used: budget.used_bytes(),
        })
}

impl Deref for OwnedBuf {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for OwnedBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl std::fmt::Debug for OwnedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedBuf")
            .field("len", &self.buf.len())
            .field("tag", &self.guard.tag())
            .finish()
    }
}

/// Hands out [`OwnedBuf`]s from one shared budget and records peak usage.
#[derive(Clone)]
pub struct BufferPool {
    budget: ByteBudget,
    peak: Arc<PeakTracker>,
}

impl BufferPool {
    pub fn new(budget: ByteBudget) -> Self {
        Self {
            budget,
            peak: Arc::new(PeakTracker::new()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(ByteBudget::unbounded())
    }

    pub fn alloc_zeroed(&self, len: usize, tag: &'static str) -> Result<OwnedBuf> {
        let buf = OwnedBuf::zeroed(&self.budget, len, tag)?;
        self.peak.record_used(self.budget.used_bytes());
        Ok(buf)
    }

    pub fn alloc_copy(&self, bytes: &[u8], tag: &'static str) -> Result<OwnedBuf> {
        let buf = OwnedBuf::copy_from(&self.budget, bytes, tag)?;
        self.peak.record_used(self.budget.used_bytes());
        Ok(buf)
    }

    pub fn budget(&self) -> &ByteBudget {
        &self.budget
    }

    pub fn used_bytes(&self) -> usize {
        self.budget.used_bytes()
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.peak()
    }
}
