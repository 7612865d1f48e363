//! BLUFI wire protocol - command framing and sequence numbers
//!
//! Every BLUFI command travels as one GATT write:
//!
//! `[type][frame_ctrl][seq][len][payload...]`
//!
//! All header fields are single bytes, so a payload can carry at most
//! 255 bytes and there is no endianness to worry about.

pub mod ble;

/// Frame control flags. This tool never sets any.
pub const FRAME_CTRL_DEFAULT: u8 = 0x00;

/// Header size in bytes: type + frame_ctrl + seq + len.
pub const HEADER_LEN: usize = 4;

/// Longest payload the single-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 255;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload length {0} does not fit the single-byte length field")]
    PayloadTooLarge(usize),
}

/// A single BLUFI command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u8,
    pub frame_ctrl: u8,
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: u8, seq: u8, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            frame_ctrl: FRAME_CTRL_DEFAULT,
            seq,
            payload,
        }
    }

    /// Serialize to wire bytes.
    ///
    /// An oversized payload is rejected rather than truncated, so a bad
    /// caller can never put a malformed length on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.packet_type);
        buf.push(self.frame_ctrl);
        buf.push(self.seq);
        buf.push(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Per-session frame counter. Starts at zero, wraps at 256.
#[derive(Debug, Default)]
pub struct SeqCounter(u8);

impl SeqCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns the sequence number for the next frame and advances.
    pub fn next(&mut self) -> u8 {
        let seq = self.0;
        self.0 = self.0.wrapping_add(1);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let packet = Packet::new(0x08, 3, vec![0x01]);
        assert_eq!(packet.to_bytes().unwrap(), vec![0x08, 0x00, 0x03, 0x01, 0x01]);
    }

    #[test]
    fn frame_length_tracks_payload() {
        for len in [0usize, 1, 64, 255] {
            let bytes = Packet::new(0x09, 0, vec![0xaa; len]).to_bytes().unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + len);
            assert_eq!(bytes[3], len as u8);
        }
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = Packet::new(0x09, 0, vec![0; 256]).to_bytes().unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge(256));
    }

    #[test]
    fn seq_starts_at_zero_and_wraps() {
        let mut seq = SeqCounter::new();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        for _ in 2..256 {
            seq.next();
        }
        assert_eq!(seq.next(), 0);
    }
}
