//! Parameters of the `seek` broker function.

use fsbroker_core::error::Result;
use fsbroker_core::id::Fd;
use fsbroker_core::serialization::{decode_u32, decode_u64, encode_u32, encode_u64, Serializable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seek {
    fd: Fd,
    offset: u64,
}

impl Default for Seek {
    fn default() -> Self {
        Self {
            fd: Fd::new(0),
            offset: 0,
        }
    }
}

impl Seek {
    pub fn new(fd: Fd, offset: u64) -> Self {
        Self { fd, offset }
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Serializable for Seek {
    fn encoding_version(&self) -> u8 {
        1
    }

    fn encoded_length_internal(&self) -> usize {
        12
    }

    fn encode_internal(&self, out: &mut Vec<u8>) {
        encode_u32(out, self.fd.get());
        encode_u64(out, self.offset);
    }

    fn decode_internal(&mut self, _version: u8, body: &mut &[u8]) -> Result<()> {
        self.fd = Fd::new(decode_u32(body)?);
        self.offset = decode_u64(body)?;
        Ok(())
    }
}
