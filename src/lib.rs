//! fsbroker: pipelined buffered reads over a file system broker.
//!
//! Facade over the workspace crates; see `fsbroker-client` for the reader.

pub use fsbroker_client::{
    broker, params, protocol, BufferedReader, CompletionSink, Event, Fault, FaultKind, FsClient,
    LocalBroker, Message, ReaderStats, StreamStatus,
};
pub use fsbroker_core::config::ReaderConfig;
pub use fsbroker_core::error::{Error, ErrorCode, Result};
pub use fsbroker_core::id::{Fd, RequestId};
pub use fsbroker_mem::{BufferPool, ByteBudget, OwnedBuf};
