//! Completion events delivered by a transport.

use std::fmt;

use fsbroker_core::error::ErrorCode;
use fsbroker_core::id::RequestId;
use fsbroker_mem::OwnedBuf;

/// A response body received for a request.
#[derive(Debug)]
pub struct Message {
    pub request_id: RequestId,
    pub body: OwnedBuf,
}

impl Message {
    pub fn new(request_id: RequestId, body: OwnedBuf) -> Self {
        Self { request_id, body }
    }
}

#[derive(Debug)]
pub enum Event {
    Message(Message),
    /// The transport failed the request without a response.
    Error { code: ErrorCode, message: String },
    ConnectionEstablished,
    Disconnect,
    Timer,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message(_) => "MESSAGE",
            Event::Error { .. } => "ERROR",
            Event::ConnectionEstablished => "CONNECTION_ESTABLISHED",
            Event::Disconnect => "DISCONNECT",
            Event::Timer => "TIMER",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event: type={}", self.kind())?;
        match self {
            Event::Message(m) => write!(f, " id={} len={}", m.request_id.get(), m.body.len()),
            Event::Error { code, message } => write!(f, " \"{message}\" code={code}"),
            _ => Ok(()),
        }
    }
}
