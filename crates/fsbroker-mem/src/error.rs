use thiserror::Error;

/// Result type local to fsbroker-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("byte budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("allocation of {requested} elements exceeds max_size {max}")]
    TooLarge { requested: usize, max: usize },

    #[error("arena span {0} does not belong to this arena")]
    ForeignSpan(String),
}

impl From<Error> for fsbroker_core::error::Error {
    fn from(e: Error) -> Self {
        use fsbroker_core::error::Error as CoreError;
        match e {
            Error::BudgetExceeded {
                requested,
                capacity,
                used,
                ..
            } => CoreError::BadAllocation {
                requested,
                max: capacity.saturating_sub(used),
            },
            Error::TooLarge { requested, max } => CoreError::BadAllocation { requested, max },
            Error::ForeignSpan(s) => CoreError::Invariant(s),
        }
    }
}
