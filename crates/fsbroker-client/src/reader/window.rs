//! Read-ahead window: how many requests may be issued and how large each is.

use fsbroker_core::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct ReadWindow {
    read_size: u32,
    max_outstanding: u32,
    end_offset: Option<u64>,
    next_issue_offset: u64,
    outstanding: u32,
}

impl ReadWindow {
    pub(crate) fn new(
        read_size: u32,
        max_outstanding: u32,
        start_offset: u64,
        end_offset: Option<u64>,
    ) -> Self {
        Self {
            read_size,
            max_outstanding,
            end_offset,
            next_issue_offset: start_offset,
            outstanding: 0,
        }
    }

    pub(crate) fn read_size(&self) -> u32 {
        self.read_size
    }

    pub(crate) fn outstanding(&self) -> u32 {
        self.outstanding
    }

    pub(crate) fn next_issue_offset(&self) -> u64 {
        self.next_issue_offset
    }

    pub(crate) fn end_offset(&self) -> Option<u64> {
        self.end_offset
    }

    /// Length of the next request; 0 once the range is used up.
    fn next_request_len(&self) -> u32 {
        match self.end_offset {
            Some(end) => {
                let remaining = end.saturating_sub(self.next_issue_offset);
                if remaining < self.read_size as u64 {
                    remaining as u32
                } else {
                    self.read_size
                }
            }
            None => self.read_size,
        }
    }

    /// Every byte of a bounded range has been requested.
    pub(crate) fn range_exhausted(&self) -> bool {
        self.end_offset
            .map_or(false, |end| self.next_issue_offset >= end)
    }

    /// Issue requests until `outstanding + queued` reaches the window size or
    /// the range runs out. `issue` is called with each request length; its
    /// first error stops filling and is returned. Returns how many were issued.
    pub(crate) fn fill<F>(&mut self, queued: usize, mut issue: F) -> Result<u32>
    where
        F: FnMut(u32) -> Result<()>,
    {
        let in_use = self.outstanding as usize + queued;
        let slots = (self.max_outstanding as usize)
            .checked_sub(in_use)
            .ok_or_else(|| {
                Error::Invariant(format!(
                    "window overcommitted: {} outstanding + {} queued > {}",
                    self.outstanding, queued, self.max_outstanding
                ))
            })?;

        let mut issued = 0;
        for _ in 0..slots {
            let len = self.next_request_len();
            if len == 0 {
                break;
            }
            issue(len)?;
            self.outstanding += 1;
            self.next_issue_offset += len as u64;
            issued += 1;
        }
        Ok(issued)
    }

    /// One issued request completed (successfully or not).
    pub(crate) fn complete(&mut self) {
        debug_assert!(self.outstanding > 0, "completion without a request");
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}
