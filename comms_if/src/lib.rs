//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Field bus frame definitions
pub mod can;

/// Command and feedback definitions for equipment on the field bus (like the drive controller)
pub mod eqpt;

/// Messages recieved from the waypoint and range sensor feeds
pub mod feed;

/// Network module
pub mod net;
