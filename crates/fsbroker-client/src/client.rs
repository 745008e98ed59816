//! Asynchronous broker client surface.

use std::sync::Arc;

use fsbroker_core::error::Result;
use fsbroker_core::id::Fd;

use crate::event::{Event, Message};
use crate::protocol::{self, ReadResponse};

/// Receiver of the completion of an issued request.
///
/// Called exactly once per accepted request, on a transport-owned thread.
pub trait CompletionSink: Send + Sync {
    fn handle(&self, event: Event);
}

/// Operations the buffered reader needs from a broker connection.
pub trait FsClient: Send + Sync {
    /// Move the server-side position of `fd`. Blocks until acknowledged.
    fn seek(&self, fd: Fd, offset: u64) -> Result<()>;

    /// Queue a read of up to `amount` bytes at the current position of `fd`.
    ///
    /// An `Err` means the request was rejected and `sink` will never be called.
    /// On `Ok`, `sink` receives exactly one event later. Implementations must
    /// not invoke `sink` before returning: callers issue while holding locks
    /// the sink also takes.
    fn read(&self, fd: Fd, amount: u32, sink: Arc<dyn CompletionSink>) -> Result<()>;

    /// Locate the payload inside a successful read response.
    fn decode_response_read(&self, msg: &Message) -> Result<ReadResponse> {
        protocol::decode_read_response(msg)
    }
}
