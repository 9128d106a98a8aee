//! # Drive Controller Equipment Commands
//!
//! The drive controller is addressed with CANopen style SDO frames. Velocity demands are
//! expedited downloads into the linear (`0x2008`) and angular (`0x2009`) target registers, and the
//! measured velocities come back as upload responses from the `0x2101` (linear) and `0x2102`
//! (angular) feedback registers.
//!
//! Payload layout of a demand:
//!
//! | Byte  | Content                                           |
//! |-------|---------------------------------------------------|
//! | 0..4  | Register selector                                 |
//! | 4..6  | Value, little endian two's complement `i16`       |
//! | 6..8  | `00 00` if the value is non-negative, else `FF FF`|

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::can::{CanFrame, MAX_DATA_LEN};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Identifier of data (SDO request) frames sent to the drive controller.
pub const DATA_FRAME_ID: u32 = 0x601;

/// Identifier of heartbeat frames sent to the drive controller.
pub const HEARTBEAT_FRAME_ID: u32 = 0x701;

/// Payload of the heartbeat frame (node operational).
pub const HEARTBEAT_PAYLOAD: [u8; MAX_DATA_LEN] = [0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Selector of the linear velocity target register.
pub const LINEAR_TARGET_SELECTOR: [u8; 4] = [0x23, 0x08, 0x20, 0x00];

/// Selector of the angular velocity target register.
pub const ANGULAR_TARGET_SELECTOR: [u8; 4] = [0x23, 0x09, 0x20, 0x00];

/// Magnitude limit of a linear velocity demand.
///
/// Units: millimeters/second
pub const LINEAR_LIMIT_MMS: i16 = 2000;

/// Magnitude limit of an angular velocity demand.
///
/// Units: milliradians/second
pub const ANGULAR_LIMIT_MRADS: i16 = 1500;

/// Leading bytes of an SDO upload response (4, 3, 2 and 1 data bytes respectively).
const UPLOAD_RESPONSE_SPECIFIERS: [u8; 4] = [0x43, 0x47, 0x4B, 0x4F];

/// Address (index low, index high, subindex) of the linear velocity feedback register.
const LINEAR_FEEDBACK_ADDR: [u8; 3] = [0x01, 0x21, 0x00];

/// Address (index low, index high, subindex) of the angular velocity feedback register.
const ANGULAR_FEEDBACK_ADDR: [u8; 3] = [0x02, 0x21, 0x00];

/// Minimum payload length of a frame carrying a feedback value.
const MIN_FEEDBACK_LEN: usize = 6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A velocity demand for the drive controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCmd {
    /// Linear velocity demand.
    ///
    /// Units: millimeters/second
    pub linear_mms: i16,

    /// Angular velocity demand, positive turns left.
    ///
    /// Units: milliradians/second
    pub angular_mrads: i16,
}

/// An 8 byte drive controller payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrivePayload(pub [u8; MAX_DATA_LEN]);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A velocity sample reported by the drive controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveFeedback {
    /// Measured linear velocity in millimeters/second.
    Linear(i16),

    /// Measured angular velocity in milliradians/second.
    Angular(i16),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveCmd {
    /// Create a new demand.
    pub fn new(linear_mms: i16, angular_mrads: i16) -> Self {
        Self {
            linear_mms,
            angular_mrads,
        }
    }

    /// The zero demand.
    pub fn stop() -> Self {
        Self::default()
    }

    /// Returns true if both components are zero.
    pub fn is_stop(&self) -> bool {
        self.linear_mms == 0 && self.angular_mrads == 0
    }

    /// Encode the demand into its two payload rows, linear first then angular.
    pub fn encode(&self) -> [DrivePayload; 2] {
        [
            DrivePayload::linear_target(self.linear_mms),
            DrivePayload::angular_target(self.angular_mrads),
        ]
    }
}

impl DrivePayload {
    /// Encode a linear velocity target.
    ///
    /// Values outside `[-LINEAR_LIMIT_MMS, LINEAR_LIMIT_MMS]` are encoded as zero.
    pub fn linear_target(linear_mms: i16) -> Self {
        Self::target(LINEAR_TARGET_SELECTOR, linear_mms, LINEAR_LIMIT_MMS)
    }

    /// Encode an angular velocity target.
    ///
    /// Values outside `[-ANGULAR_LIMIT_MRADS, ANGULAR_LIMIT_MRADS]` are encoded as zero.
    pub fn angular_target(angular_mrads: i16) -> Self {
        Self::target(ANGULAR_TARGET_SELECTOR, angular_mrads, ANGULAR_LIMIT_MRADS)
    }

    /// The heartbeat payload.
    pub fn heartbeat() -> Self {
        Self(HEARTBEAT_PAYLOAD)
    }

    /// The register selector (first four bytes).
    pub fn selector(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    /// The value carried in bytes 4 and 5.
    pub fn value(&self) -> i16 {
        decode_value(self.0[4], self.0[5])
    }

    /// Build a data frame carrying this payload.
    pub fn to_frame(&self, id: u32) -> CanFrame {
        CanFrame::new_data(id, self.0)
    }

    fn target(selector: [u8; 4], value: i16, limit: i16) -> Self {
        let mut data = [0u8; MAX_DATA_LEN];
        data[..4].copy_from_slice(&selector);

        // Out of range values leave the value and sign bytes zeroed
        if (-limit..=limit).contains(&value) {
            LittleEndian::write_i16(&mut data[4..6], value);
            if value < 0 {
                data[6] = 0xFF;
                data[7] = 0xFF;
            }
        }

        Self(data)
    }
}

impl DriveFeedback {
    /// Decode a feedback sample from a frame.
    ///
    /// Returns `None` for any frame which isn't a velocity feedback response.
    pub fn from_frame(frame: &CanFrame) -> Option<Self> {
        Self::from_payload(frame.payload())
    }

    /// Decode a feedback sample from a raw payload.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < MIN_FEEDBACK_LEN {
            return None;
        }

        if !UPLOAD_RESPONSE_SPECIFIERS.contains(&payload[0]) {
            return None;
        }

        let value = decode_value(payload[4], payload[5]);

        if payload[1..4] == LINEAR_FEEDBACK_ADDR {
            Some(DriveFeedback::Linear(value))
        } else if payload[1..4] == ANGULAR_FEEDBACK_ADDR {
            Some(DriveFeedback::Angular(value))
        } else {
            None
        }
    }

    /// Encode this sample as a 2 byte upload response, as sent by the drive controller.
    pub fn to_payload(&self) -> [u8; MAX_DATA_LEN] {
        let (addr, value) = match *self {
            DriveFeedback::Linear(v) => (LINEAR_FEEDBACK_ADDR, v),
            DriveFeedback::Angular(w) => (ANGULAR_FEEDBACK_ADDR, w),
        };

        let mut data = [0u8; MAX_DATA_LEN];
        data[0] = 0x4B;
        data[1..4].copy_from_slice(&addr);
        LittleEndian::write_i16(&mut data[4..6], value);

        data
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Rebuild a signed value from its low and high bytes, `(hi << 8) | lo` as an `i16`.
pub fn decode_value(lo: u8, hi: u8) -> i16 {
    LittleEndian::read_i16(&[lo, hi])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_linear_round_trip() {
        for v in -LINEAR_LIMIT_MMS..=LINEAR_LIMIT_MMS {
            assert_eq!(DrivePayload::linear_target(v).value(), v);
        }

        for &v in [2001, -2001, 5000, i16::MAX, i16::MIN].iter() {
            assert_eq!(DrivePayload::linear_target(v).value(), 0);
        }
    }

    #[test]
    fn test_angular_round_trip() {
        for w in -ANGULAR_LIMIT_MRADS..=ANGULAR_LIMIT_MRADS {
            assert_eq!(DrivePayload::angular_target(w).value(), w);
        }

        for &w in [1501, -1501, 2000, i16::MAX, i16::MIN].iter() {
            assert_eq!(DrivePayload::angular_target(w).value(), 0);
        }
    }

    #[test]
    fn test_payload_layout() {
        assert_eq!(
            DrivePayload::linear_target(1000).0,
            [0x23, 0x08, 0x20, 0x00, 0xE8, 0x03, 0x00, 0x00]
        );
        assert_eq!(
            DrivePayload::angular_target(-500).0,
            [0x23, 0x09, 0x20, 0x00, 0x0C, 0xFE, 0xFF, 0xFF]
        );
        assert_eq!(
            DrivePayload::angular_target(-1501).0,
            [0x23, 0x09, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(DrivePayload::heartbeat().0, HEARTBEAT_PAYLOAD);

        let rows = DriveCmd::new(0, 500).encode();
        assert_eq!(rows[0].selector(), LINEAR_TARGET_SELECTOR);
        assert_eq!(rows[1].selector(), ANGULAR_TARGET_SELECTOR);
        assert_eq!(rows[1].value(), 500);
    }

    #[test]
    fn test_decode_is_reinterpretation() {
        assert_eq!(decode_value(0x0C, 0xFE), -500);
        assert_eq!(decode_value(0xFF, 0x7F), i16::MAX);
        assert_eq!(decode_value(0x00, 0x80), i16::MIN);
    }

    #[test]
    fn test_feedback_filter() {
        for &spec in UPLOAD_RESPONSE_SPECIFIERS.iter() {
            let frame = CanFrame::new_data(0x581, [spec, 0x01, 0x21, 0x00, 0xE8, 0x03, 0, 0]);
            assert_eq!(DriveFeedback::from_frame(&frame), Some(DriveFeedback::Linear(1000)));

            let frame = CanFrame::new_data(0x581, [spec, 0x02, 0x21, 0x00, 0x0C, 0xFE, 0, 0]);
            assert_eq!(DriveFeedback::from_frame(&frame), Some(DriveFeedback::Angular(-500)));
        }

        // Download acknowledgement, wrong register, and a short frame are all dropped
        let ack = CanFrame::new_data(0x581, [0x60, 0x01, 0x21, 0x00, 0xE8, 0x03, 0, 0]);
        assert_eq!(DriveFeedback::from_frame(&ack), None);
        let other = CanFrame::new_data(0x581, [0x4B, 0x03, 0x21, 0x00, 0xE8, 0x03, 0, 0]);
        assert_eq!(DriveFeedback::from_frame(&other), None);
        let mut short = CanFrame::new_data(0x581, [0x4B, 0x01, 0x21, 0x00, 0xE8, 0x03, 0, 0]);
        short.data_len = 5;
        assert_eq!(DriveFeedback::from_frame(&short), None);

        // Our own demands are not feedback
        let dem = DrivePayload::linear_target(100).to_frame(DATA_FRAME_ID);
        assert_eq!(DriveFeedback::from_frame(&dem), None);
    }

    #[test]
    fn test_feedback_payload() {
        let fb = DriveFeedback::Angular(-1200);
        assert_eq!(DriveFeedback::from_payload(&fb.to_payload()), Some(fb));
    }
}
