//! # Control Cycle
//!
//! One cycle of the navigation loop: segment control decides the demand, the transmit loop sends
//! this cycle's frame, and the position is advanced from the latest odometry.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;

use comms_if::eqpt::drive::DriveCmd;
use util::module::State;
use crate::{
    bus::BusTransport,
    data_store::DataStore,
    odom::SharedOdom,
    tx_loop::TxError,
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the control part of a cycle.
///
/// A transmit failure is returned and must end the run. Segment control errors only stop the
/// vehicle for this cycle.
pub fn step(
    ds: &mut DataStore,
    bus: &dyn BusTransport,
    odom: &SharedOdom,
    cycle_period_s: f64
) -> Result<(), TxError> {

    match ds.seg_ctrl.proc(&ds.seg_ctrl_input) {
        Ok((o, r)) => {
            ds.seg_ctrl_output = o;
            ds.seg_ctrl_status_rpt = r;
        },
        Err(e) => {
            warn!("Error during SegCtrl processing: {}", e);
            ds.seg_ctrl_output = DriveCmd::stop();
            ds.seg_ctrl_status_rpt = ds.seg_ctrl.report();
        }
    }

    ds.tx_frame = Some(ds.tx_loop.tick(bus, &ds.seg_ctrl_output)?);

    ds.odom = *odom.lock().expect("Odometry mutex poisoned");
    ds.position.integrate(&ds.odom, cycle_period_s);

    Ok(())
}
