//! Parameters structure for SegCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Segment control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    // ---- THRESHOLDS ----

    /// Heading error at or below which the rotation is complete.
    ///
    /// Units: radians
    pub head_threshold_rad: f64,

    /// Distance error at or below which the translation is complete.
    ///
    /// Units: millimeters
    pub dist_threshold_mm: f64,

    /// Maximum distance driven in a single segment.
    ///
    /// Units: millimeters
    pub dist_cap_mm: f64,

    /// Range readings below this stop the vehicle.
    ///
    /// Units: raw sensor units
    pub safety_range_threshold: i32,

    // ---- RATES ----

    /// Magnitude of the turn rate used when rotating.
    ///
    /// Units: milliradians/second
    pub rotate_rate_mrads: i16,

    /// Speed used when translating.
    ///
    /// Units: millimeters/second
    pub translate_rate_mms: i16,

    // ---- TIMING ----

    /// Period the open loop estimates are integrated over per cycle.
    ///
    /// Units: seconds
    pub open_loop_period_s: f64,

    /// Number of cycles the vehicle stands still after finishing a segment.
    pub pause_cycles: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            head_threshold_rad: 0.1,
            dist_threshold_mm: 100.0,
            dist_cap_mm: 10_000.0,
            safety_range_threshold: 50,
            rotate_rate_mrads: 500,
            translate_rate_mms: 1000,
            open_loop_period_s: 0.01,
            pause_cycles: 200,
        }
    }
}
