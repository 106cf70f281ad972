//! MIDI message helpers
//!
//! The router only looks at the status byte and the two data bytes, so
//! messages are kept raw: no channel decoding, no running status.

use std::fmt;

/// A raw channel message as delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub status: u8,
    /// Note number or controller number
    pub data1: u8,
    /// Velocity or controller value
    pub data2: u8,
    /// Number of bytes the transport delivered
    pub len: usize,
}

impl RawMessage {
    /// Three-byte message
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
            len: 3,
        }
    }

    /// Read a message from transport bytes. Missing data bytes read as 0.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        Some(Self {
            status,
            data1: data.get(1).copied().unwrap_or(0),
            data2: data.get(2).copied().unwrap_or(0),
            len: data.len(),
        })
    }

    /// The bytes this message was read from (padded if the payload was short)
    pub fn bytes(&self) -> Vec<u8> {
        let all = [self.status, self.data1, self.data2];
        all[..self.len.min(3)].to_vec()
    }
}

/// Echo line for `log_midi_messages`
pub struct Echo<'a>(pub &'a [u8]);

impl fmt::Display for Echo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [status, data1, data2] = self.0 {
            return write!(f, "Status = {}, Data1 = {}, Data2 = {}", status, data1, data2);
        }
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "Byte {} = {}", i, byte)?;
        }
        Ok(())
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
