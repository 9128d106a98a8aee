//! # Navigation Executable Parameters
//!
//! This module provides the parameters for the navigation executable, loaded from
//! `nav_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};
use serde::Deserialize;

use crate::{
    bus::BusParams,
    feedback::FeedbackParams,
    path::PathParams,
    seg_ctrl,
    tx_loop::TxParams
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Smallest heartbeat period which still leaves room for demand frames.
pub const MIN_HEARTBEAT_PERIOD_CYCLES: u32 = 2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NavExecParams {

    /// Target period of one cycle
    pub cycle_period_s: f64,

    /// Number of cycles between heartbeat frames
    pub heartbeat_period_cycles: u32,

    /// Time the main loop runs for before shutting down
    pub run_duration_s: f64,

    /// Time waited after the main loop ends before the feedback listener is stopped
    pub shutdown_linger_s: f64,

    /// Maximum time to wait for the feedback listener to exit
    pub listener_join_timeout_s: f64,

    /// Pause after resetting each channel
    pub channel_reset_delay_s: f64,

    /// Number of times a failed transmit is retried before the run is aborted
    pub tx_retry_limit: u32,

    pub bus: BusParams,

    pub feedback: FeedbackParams,

    pub path: PathParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("The cycle period must be positive, got {0} s")]
    InvalidCyclePeriod(f64),

    #[error(
        "The heartbeat period must be at least {} cycles, got {0}",
        MIN_HEARTBEAT_PERIOD_CYCLES
    )]
    HeartbeatPeriodTooShort(u32),

    #[error(
        "SegCtrl integrates over {open_loop_s} s per cycle but the cycle period is {cycle_s} s"
    )]
    PeriodMismatch {
        cycle_s: f64,
        open_loop_s: f64
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NavExecParams {
    /// Check the parameters are usable together with the SegCtrl parameters.
    pub fn check(&self, seg_ctrl_params: &seg_ctrl::Params) -> Result<(), ParamsError> {
        if !(self.cycle_period_s > 0.0) {
            return Err(ParamsError::InvalidCyclePeriod(self.cycle_period_s));
        }

        if self.heartbeat_period_cycles < MIN_HEARTBEAT_PERIOD_CYCLES {
            return Err(ParamsError::HeartbeatPeriodTooShort(self.heartbeat_period_cycles));
        }

        // The open loop estimates are only valid if they advance at the real tick rate
        if (seg_ctrl_params.open_loop_period_s - self.cycle_period_s).abs() > 1e-9 {
            return Err(ParamsError::PeriodMismatch {
                cycle_s: self.cycle_period_s,
                open_loop_s: seg_ctrl_params.open_loop_period_s
            });
        }

        Ok(())
    }

    /// Parameters of the transmit loop.
    pub fn tx_params(&self) -> TxParams {
        TxParams {
            channel: self.bus.tx_channel,
            heartbeat_period_cycles: self.heartbeat_period_cycles,
            retry_limit: self.tx_retry_limit,
        }
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_period_s)
    }

    pub fn shutdown_linger(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_linger_s)
    }

    pub fn listener_join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.listener_join_timeout_s)
    }

    pub fn channel_reset_delay(&self) -> Duration {
        Duration::from_secs_f64(self.channel_reset_delay_s)
    }

    /// True once the run started at `run_start` has lasted the run duration.
    ///
    /// Measured on the monotonic clock so wall clock steps don't change the run length.
    pub fn run_elapsed(&self, run_start: Instant) -> bool {
        run_start.elapsed().as_secs_f64() >= self.run_duration_s
    }
}

impl Default for NavExecParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.01,
            heartbeat_period_cycles: 20,
            run_duration_s: 30.0,
            shutdown_linger_s: 2.0,
            listener_join_timeout_s: 1.0,
            channel_reset_delay_s: 0.1,
            tx_retry_limit: 0,
            bus: BusParams::default(),
            feedback: FeedbackParams::default(),
            path: PathParams::default(),
        }
    }
}
