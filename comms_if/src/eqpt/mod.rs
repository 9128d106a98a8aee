//! # Equipment Interface
//!
//! This module defines the interface structures which are sent to and recieved from equipment on
//! the field bus.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod drive;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use drive::{DriveCmd, DriveFeedback, DrivePayload};
