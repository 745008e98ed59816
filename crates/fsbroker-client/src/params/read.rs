//! Parameters of the `read` broker function.

use fsbroker_core::error::Result;
use fsbroker_core::id::Fd;
use fsbroker_core::serialization::{decode_u32, encode_u32, Serializable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Read {
    fd: Fd,
    amount: u32,
}

impl Default for Read {
    fn default() -> Self {
        Self {
            fd: Fd::new(0),
            amount: 0,
        }
    }
}

impl Read {
    pub fn new(fd: Fd, amount: u32) -> Self {
        Self { fd, amount }
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }
}

impl Serializable for Read {
    fn encoding_version(&self) -> u8 {
        1
    }

    fn encoded_length_internal(&self) -> usize {
        8
    }

    fn encode_internal(&self, out: &mut Vec<u8>) {
        encode_u32(out, self.fd.get());
        encode_u32(out, self.amount);
    }

    fn decode_internal(&mut self, _version: u8, body: &mut &[u8]) -> Result<()> {
        self.fd = Fd::new(decode_u32(body)?);
        self.amount = decode_u32(body)?;
        Ok(())
    }
}
