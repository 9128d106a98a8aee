//! # CAN Frame Definitions
//!
//! Frames exchanged with the bus transport. The layout follows the one used by USB-CAN adapter
//! drivers: an identifier, a data length code, an 8 byte payload and a handful of flags.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of payload bytes in a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single CAN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Frame identifier
    pub id: u32,

    /// Number of valid bytes in `data`, at most [`MAX_DATA_LEN`].
    pub data_len: u8,

    /// Frame payload. Bytes past `data_len` carry no meaning.
    pub data: [u8; MAX_DATA_LEN],

    /// Transmission flags
    pub flags: FrameFlags,
}

/// Flags attached to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameFlags {
    /// Adapter send type, 0 is normal send (with automatic retransmission).
    pub send_type: u8,

    /// True for a remote (RTR) frame, false for a data frame.
    pub remote: bool,

    /// True for an extended (29 bit) identifier, false for a standard one.
    pub extended: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CanFrame {
    /// Create a standard, full length data frame with the given identifier and payload.
    pub fn new_data(id: u32, data: [u8; MAX_DATA_LEN]) -> Self {
        Self {
            id,
            data_len: MAX_DATA_LEN as u8,
            data,
            flags: FrameFlags::default(),
        }
    }

    /// Get the valid part of the payload.
    ///
    /// A `data_len` larger than the payload is truncated to the payload length.
    pub fn payload(&self) -> &[u8] {
        let len = (self.data_len as usize).min(MAX_DATA_LEN);
        &self.data[..len]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_payload_truncation() {
        let mut frame = CanFrame::new_data(0x601, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.payload().len(), 8);
        assert!(!frame.flags.remote);
        assert!(!frame.flags.extended);

        frame.data_len = 3;
        assert_eq!(frame.payload(), &[1, 2, 3]);

        frame.data_len = 200;
        assert_eq!(frame.payload().len(), MAX_DATA_LEN);
    }
}
