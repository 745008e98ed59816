use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::Fd;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric status codes carried on the wire and attached to every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// A completion did not match any shape the client knows how to handle.
    FailedExpectation = -1,
    Ok = 0,
    ProtocolError = 1,
    RequestTruncated = 2,
    ResponseTruncated = 3,
    RequestTimeout = 4,
    LocalIoError = 5,
    BadMemoryAllocation = 6,
    CommBrokenConnection = 7,
    CommNotConnected = 8,
    InvalidConfig = 9,
    BadFileHandle = 0x0002_0001,
    IoError = 0x0002_0002,
    FileNotFound = 0x0002_0003,
    InvalidArgument = 0x0002_0006,
    Eof = 0x0002_0008,
    Unknown = i32::MAX,
}

impl ErrorCode {
    pub fn from_i32(v: i32) -> Self {
        match v {
            -1 => ErrorCode::FailedExpectation,
            0 => ErrorCode::Ok,
            1 => ErrorCode::ProtocolError,
            2 => ErrorCode::RequestTruncated,
            3 => ErrorCode::ResponseTruncated,
            4 => ErrorCode::RequestTimeout,
            5 => ErrorCode::LocalIoError,
            6 => ErrorCode::BadMemoryAllocation,
            7 => ErrorCode::CommBrokenConnection,
            8 => ErrorCode::CommNotConnected,
            9 => ErrorCode::InvalidConfig,
            0x0002_0001 => ErrorCode::BadFileHandle,
            0x0002_0002 => ErrorCode::IoError,
            0x0002_0003 => ErrorCode::FileNotFound,
            0x0002_0006 => ErrorCode::InvalidArgument,
            0x0002_0008 => ErrorCode::Eof,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::FailedExpectation => "FAILED_EXPECTATION",
            ErrorCode::Ok => "OK",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::RequestTruncated => "REQUEST_TRUNCATED",
            ErrorCode::ResponseTruncated => "RESPONSE_TRUNCATED",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::LocalIoError => "LOCAL_IO_ERROR",
            ErrorCode::BadMemoryAllocation => "BAD_MEMORY_ALLOCATION",
            ErrorCode::CommBrokenConnection => "COMM_BROKEN_CONNECTION",
            ErrorCode::CommNotConnected => "COMM_NOT_CONNECTED",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::BadFileHandle => "FSBROKER_BAD_FILE_HANDLE",
            ErrorCode::IoError => "FSBROKER_IO_ERROR",
            ErrorCode::FileNotFound => "FSBROKER_FILE_NOT_FOUND",
            ErrorCode::InvalidArgument => "FSBROKER_INVALID_ARGUMENT",
            ErrorCode::Eof => "FSBROKER_EOF",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The broker answered with a non-OK response code.
    #[error("{code}: {message}")]
    Protocol { code: ErrorCode, message: String },

    /// The transport reported a failure instead of delivering a response.
    #[error("{code}: {message}")]
    Transport { code: ErrorCode, message: String },

    /// A completion arrived that is neither a message nor a recognized error.
    #[error("FAILED_EXPECTATION: {0}")]
    FailedExpectation(String),

    /// The stream was read past its end with nothing left to return.
    #[error("FSBROKER_EOF: {0}")]
    Eof(String),

    #[error("BAD_MEMORY_ALLOCATION: requested {requested} exceeds maximum {max}")]
    BadAllocation { requested: usize, max: usize },

    #[error("FSBROKER_BAD_FILE_HANDLE: {0}")]
    BadFileHandle(Fd),

    #[error("FSBROKER_IO_ERROR: {0}")]
    Io(String),

    #[error("INVALID_CONFIG: {0}")]
    Config(String),

    #[error("truncated: {0}")]
    Truncated(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Machine-checkable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Protocol { code, .. } | Error::Transport { code, .. } => *code,
            Error::FailedExpectation(_) | Error::Invariant(_) => ErrorCode::FailedExpectation,
            Error::Eof(_) => ErrorCode::Eof,
            Error::BadAllocation { .. } => ErrorCode::BadMemoryAllocation,
            Error::BadFileHandle(_) => ErrorCode::BadFileHandle,
            Error::Io(_) => ErrorCode::IoError,
            Error::Config(_) => ErrorCode::InvalidConfig,
            Error::Truncated(_) => ErrorCode::ResponseTruncated,
        }
    }

    /// Human-readable part of the error, without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Protocol { message, .. } | Error::Transport { message, .. } => message.clone(),
            Error::FailedExpectation(m)
            | Error::Eof(m)
            | Error::Io(m)
            | Error::Config(m)
            | Error::Truncated(m)
            | Error::Invariant(m) => m.clone(),
            Error::BadAllocation { requested, max } => {
                format!("requested {requested} exceeds maximum {max}")
            }
            Error::BadFileHandle(fd) => format!("bad file handle {fd}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
