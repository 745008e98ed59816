//! One-way terminal latch of a buffered read stream.

use fsbroker_core::error::{Error, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamState {
    Open,
    /// No further requests; everything buffered is still readable.
    Eof,
    /// First failure observed; surfaced once buffered data ahead of it drains.
    Failed(Error),
}

/// Snapshot of a stream's terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Open,
    Eof,
    Failed(ErrorCode),
}

impl StreamState {
    pub(crate) fn is_open(&self) -> bool {
        matches!(self, StreamState::Open)
    }

    /// `Open -> Eof`. Returns whether the transition happened.
    pub(crate) fn latch_eof(&mut self) -> bool {
        if self.is_open() {
            *self = StreamState::Eof;
            return true;
        }
        false
    }

    /// `Open -> Failed`. A stream already at EOF or failed keeps its state.
    pub(crate) fn latch_error(&mut self, err: Error) -> bool {
        if self.is_open() {
            *self = StreamState::Failed(err);
            return true;
        }
        false
    }

    pub(crate) fn status(&self) -> StreamStatus {
        match self {
            StreamState::Open => StreamStatus::Open,
            StreamState::Eof => StreamStatus::Eof,
            StreamState::Failed(e) => StreamStatus::Failed(e.code()),
        }
    }
}
