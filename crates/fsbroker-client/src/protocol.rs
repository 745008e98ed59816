//! Response layouts.
//!
//! Every response body starts with a little-endian `i32` status code.
//!
//! ```text
//! read ok:  [ code = 0: i32 ][ offset: u64 ][ amount: u32 ][ data: amount bytes ]
//! error:    [ code != 0: i32 ][ message_len: u16 ][ message: utf-8 ]
//! ```

use std::ops::Range;

use fsbroker_core::error::{Error, ErrorCode, Result};
use fsbroker_core::serialization::{
    decode_i32, decode_str16, decode_u32, decode_u64, encode_i32, encode_str16,
    encoded_length_str16,
};
use fsbroker_mem::{BufferPool, OwnedBuf};

use crate::event::Message;

pub const READ_HEADER_LEN: usize = 4 + 8 + 4;

/// Decoded header of a successful read response. `data` indexes the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub offset: u64,
    pub amount: u32,
    pub data: Range<usize>,
}

pub fn response_code(msg: &Message) -> Result<ErrorCode> {
    let mut cur: &[u8] = &msg.body;
    Ok(ErrorCode::from_i32(decode_i32(&mut cur)?))
}

/// Message text of an error response; falls back to a description of the body.
pub fn error_message(msg: &Message) -> String {
    let mut cur: &[u8] = &msg.body;
    let decoded = decode_i32(&mut cur).and_then(|_| decode_str16(&mut cur));
    match decoded {
        Ok(s) => s,
        Err(e) => format!("malformed error response ({} bytes): {e}", msg.body.len()),
    }
}

/// Turn a non-OK response into the error it carries. `Ok(())` for status OK.
pub fn check_response(msg: &Message) -> Result<()> {
    let code = response_code(msg)?;
    if code.is_ok() {
        return Ok(());
    }
    Err(Error::Protocol {
        code,
        message: error_message(msg),
    })
}

pub fn decode_read_response(msg: &Message) -> Result<ReadResponse> {
    let body: &[u8] = &msg.body;
    let mut cur = body;
    let code = ErrorCode::from_i32(decode_i32(&mut cur)?);
    if !code.is_ok() {
        return Err(Error::Protocol {
            code,
            message: error_message(msg),
        });
    }
    let offset = decode_u64(&mut cur)?;
    let amount = decode_u32(&mut cur)?;
    if cur.len() < amount as usize {
        return Err(Error::Truncated(format!(
            "read response claims {amount} bytes, body holds {}",
            cur.len()
        )));
    }
    Ok(ReadResponse {
        offset,
        amount,
        data: READ_HEADER_LEN..READ_HEADER_LEN + amount as usize,
    })
}

/// Fill the header of a read response whose data already sits after it.
pub fn write_read_header(body: &mut [u8], offset: u64, amount: u32) {
    body[0..4].copy_from_slice(&ErrorCode::Ok.as_i32().to_le_bytes());
    body[4..12].copy_from_slice(&offset.to_le_bytes());
    body[12..16].copy_from_slice(&amount.to_le_bytes());
}

pub fn encode_read_response(pool: &BufferPool, offset: u64, data: &[u8]) -> Result<OwnedBuf> {
    let mut body = pool.alloc_zeroed(READ_HEADER_LEN + data.len(), "read-response")?;
    write_read_header(&mut body, offset, data.len() as u32);
    body[READ_HEADER_LEN..].copy_from_slice(data);
    Ok(body)
}

pub fn encode_error_response(pool: &BufferPool, code: ErrorCode, message: &str) -> Result<OwnedBuf> {
    let mut out = Vec::with_capacity(4 + encoded_length_str16(message));
    encode_i32(&mut out, code.as_i32());
    encode_str16(&mut out, message);
    Ok(pool.alloc_copy(&out, "error-response")?)
}
