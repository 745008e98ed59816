#![forbid(unsafe_code)]
//! fsbroker-client: talking to a file system broker.
//!
//! - [`FsClient`] / [`CompletionSink`]: the asynchronous request surface.
//! - [`protocol`]: response layouts and their decoders.
//! - [`params`]: request parameter structs.
//! - [`LocalBroker`]: in-process broker serving memory or disk files.
//! - [`BufferedReader`]: blocking sequential reads over a window of
//!   outstanding read requests.

pub mod broker;
pub mod client;
pub mod event;
pub mod params;
pub mod protocol;
pub mod reader;

pub use broker::{Fault, FaultKind, LocalBroker};
pub use client::{CompletionSink, FsClient};
pub use event::{Event, Message};
pub use reader::{BufferedReader, ReaderStats, StreamStatus};
