//! # Segment Control module
//!
//! Segment control drives the vehicle along the path one segment at a time. Each segment is
//! driven open loop in two phases: first the vehicle turns on the spot until its estimated heading
//! points at the end of the segment, then it drives straight until its estimated distance matches
//! the segment length. Estimates are integrated from the commanded velocities only, measured
//! feedback is never used to correct them.
//!
//! A safety stop overrides both phases whenever there's no complete path yet, an obstacle is too
//! close, the path is finished, or the vehicle is pausing between segments.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during SegCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum SegCtrlError {
    #[error("The path is complete but has {0} point(s), at least 2 are needed")]
    PathTooShort(usize),
}

/// Possible errors that can occur during SegCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum SegCtrlInitError {
    #[error("Could not load the parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Could not create the archive: {0}")]
    ArchiveError(util::archive::ArchiveError),
}
