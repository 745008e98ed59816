//! Fixed-layout little-endian codec for request parameters.
//!
//! Every parameter struct is framed by the same envelope:
//!
//! ```text
//! [ version: u8 ][ body_len: u32 ][ body … ]
//! ```
//!
//! Decoders walk a `&mut &[u8]` cursor and fail with [`Error::Truncated`] as
//! soon as fewer bytes remain than a field needs.

use crate::error::{Error, ErrorCode, Result};

pub const ENVELOPE_LEN: usize = 1 + 4;

pub fn encode_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn encode_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn encode_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// `[len: u16][utf-8 bytes]`; strings longer than `u16::MAX` are cut.
pub fn encode_str16(out: &mut Vec<u8>, s: &str) {
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out.extend_from_slice(&(end as u16).to_le_bytes());
    out.extend_from_slice(&s.as_bytes()[..end]);
}

pub fn encoded_length_str16(s: &str) -> usize {
    2 + s.len().min(u16::MAX as usize)
}

fn take<const N: usize>(buf: &mut &[u8], what: &str) -> Result<[u8; N]> {
    if buf.len() < N {
        return Err(Error::Truncated(format!(
            "decoding {what}: need {N} bytes, {} remain",
            buf.len()
        )));
    }
    let (head, rest) = (*buf).split_at(N);
    *buf = rest;
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    Ok(out)
}

pub fn decode_u8(buf: &mut &[u8]) -> Result<u8> {
    Ok(take::<1>(buf, "u8")?[0])
}

pub fn decode_i32(buf: &mut &[u8]) -> Result<i32> {
    Ok(i32::from_le_bytes(take(buf, "i32")?))
}

pub fn decode_u32(buf: &mut &[u8]) -> Result<u32> {
    Ok(u32::from_le_bytes(take(buf, "u32")?))
}

pub fn decode_u64(buf: &mut &[u8]) -> Result<u64> {
    Ok(u64::from_le_bytes(take(buf, "u64")?))
}

pub fn decode_str16(buf: &mut &[u8]) -> Result<String> {
    let len = u16::from_le_bytes(take(buf, "string length")?) as usize;
    if buf.len() < len {
        return Err(Error::Truncated(format!(
            "decoding string: need {len} bytes, {} remain",
            buf.len()
        )));
    }
    let (head, rest) = (*buf).split_at(len);
    *buf = rest;
    Ok(String::from_utf8_lossy(head).into_owned())
}

/// Versioned, length-prefixed encoding shared by all request parameters.
pub trait Serializable: Sized {
    fn encoding_version(&self) -> u8;

    fn encoded_length_internal(&self) -> usize;

    fn encode_internal(&self, out: &mut Vec<u8>);

    fn decode_internal(&mut self, version: u8, body: &mut &[u8]) -> Result<()>;

    /// Highest version this type can decode.
    fn max_supported_version(&self) -> u8 {
        self.encoding_version()
    }

    fn encoded_length(&self) -> usize {
        ENVELOPE_LEN + self.encoded_length_internal()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_length());
        out.push(self.encoding_version());
        encode_u32(out, self.encoded_length_internal() as u32);
        self.encode_internal(out);
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_length());
        self.encode(&mut out);
        out
    }

    /// Decode one envelope from `buf`, advancing it past the whole body even
    /// when `decode_internal` leaves trailing bytes a newer encoder added.
    fn decode(&mut self, buf: &mut &[u8]) -> Result<()> {
        let version = decode_u8(buf)?;
        if version == 0 || version > self.max_supported_version() {
            return Err(Error::Protocol {
                code: ErrorCode::ProtocolError,
                message: format!("unsupported encoding version {version}"),
            });
        }
        let len = decode_u32(buf)? as usize;
        if buf.len() < len {
            return Err(Error::Truncated(format!(
                "parameter body: need {len} bytes, {} remain",
                buf.len()
            )));
        }
        let (mut body, rest) = (*buf).split_at(len);
        self.decode_internal(version, &mut body)?;
        *buf = rest;
        Ok(())
    }
}
