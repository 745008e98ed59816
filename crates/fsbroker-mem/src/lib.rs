#![forbid(unsafe_code)]
//! fsbroker-mem: byte budgeting, payload buffers, and page arenas.
//!
//! Every response payload the client buffers is an [`OwnedBuf`] acquired from a
//! [`BufferPool`], so the bytes parked in read-ahead windows are accounted
//! against one ceiling. [`PageArena`] and [`ArenaAllocator`] carve many small
//! arrays out of a few large pages.

pub mod arena;
pub mod error;
pub mod guard;
pub mod pool;
pub mod tracking;

pub use arena::{Allocation, ArenaAllocator, ArenaSpan, PageArena};
pub use guard::{ByteBudget, ByteGuard};
pub use pool::{BufferPool, OwnedBuf};
