//! Parameters of the `debug` broker function.

use fsbroker_core::error::Result;
use fsbroker_core::serialization::{decode_i32, encode_i32, Serializable};

/// Ask the broker to log its statistics.
pub const DEBUG_DUMP_STATS: i32 = 1;
/// Ask the broker to drop cached state for closed files.
pub const DEBUG_PURGE_CLOSED: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Debug {
    command: i32,
}

impl Debug {
    pub fn new(command: i32) -> Self {
        Self { command }
    }

    pub fn command(&self) -> i32 {
        self.command
    }
}

impl Serializable for Debug {
    fn encoding_version(&self) -> u8 {
        1
    }

    fn encoded_length_internal(&self) -> usize {
        4
    }

    fn encode_internal(&self, out: &mut Vec<u8>) {
        encode_i32(out, self.command);
    }

    fn decode_internal(&mut self, _version: u8, body: &mut &[u8]) -> Result<()> {
        self.command = decode_i32(body)?;
        Ok(())
    }
}
