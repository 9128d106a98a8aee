//! # Odometry
//!
//! Dead reckoning from the velocities reported by the drive controller. The feedback listener
//! folds every sample into the shared [`OdomState`], the main loop integrates a [`Position`] from
//! it once per cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};
use serde::Serialize;

use comms_if::eqpt::drive::DriveFeedback;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Odometry state shared between the feedback listener and the main loop.
pub type SharedOdom = Arc<Mutex<OdomState>>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Accumulated feedback. Never reset during a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct OdomState {
    /// Accumulated distance
    ///
    /// Units: millimeters
    pub dist_sum_mm: f64,

    /// Accumulated heading
    ///
    /// Units: radians
    pub head_sum_rad: f64,

    /// Last reported linear velocity
    ///
    /// Units: millimeters/second
    pub linear_mms: i16,

    /// Last reported angular velocity
    ///
    /// Units: milliradians/second
    pub angular_mrads: i16,
}

/// Integrated position of the vehicle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x_m: f64,
    pub y_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OdomState {
    /// Create a new shared odometry state.
    pub fn new_shared() -> SharedOdom {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Fold a feedback sample in, assuming it holds for `sample_period_s`.
    pub fn apply(&mut self, fb: DriveFeedback, sample_period_s: f64) {
        match fb {
            DriveFeedback::Linear(v) => {
                self.linear_mms = v;
                self.dist_sum_mm += v as f64 * sample_period_s;
            },
            DriveFeedback::Angular(w) => {
                self.angular_mrads = w;
                self.head_sum_rad += w as f64 * 0.001 * sample_period_s;
            }
        }
    }
}

impl Position {
    /// Advance the position by `dt_s` using the last linear velocity along the accumulated
    /// heading.
    pub fn integrate(&mut self, odom: &OdomState, dt_s: f64) {
        let v_ms = odom.linear_mms as f64 * 0.001;

        self.x_m += v_ms * odom.head_sum_rad.cos() * dt_s;
        self.y_m += v_ms * odom.head_sum_rad.sin() * dt_s;
    }
}
