//! # Feed Messages
//!
//! Messages published by the waypoint producer and the range sensor. Both feeds share a single
//! message type so that they can be carried on one socket or interleaved in one script.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A message from one of the input feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMsg {
    /// A new waypoint in raw producer units.
    Waypoint {
        x: i32,
        y: i32
    },

    /// A new obstacle range reading in raw sensor units.
    Range {
        dist: i32
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FeedMsg {
    /// Parse a message from its JSON representation.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }
}
