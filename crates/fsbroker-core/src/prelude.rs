//! Convenient re-exports for downstream crates.

pub use crate::budget::{BudgetGuard, MemoryBudget};
pub use crate::config::ReaderConfig;
pub use crate::error::{Error, ErrorCode, Result};
pub use crate::id::{Fd, RequestId};
pub use crate::serialization::Serializable;
