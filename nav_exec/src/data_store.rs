//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};

use comms_if::{can::CanFrame, eqpt::drive::DriveCmd, feed::FeedMsg};
use crate::{
    odom::{OdomState, Position},
    params::NavExecParams,
    path::Path,
    seg_ctrl,
    tx_loop::TxLoop,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u64,

    /// Session time at the start of this cycle
    pub session_time_s: f64,

    // SegCtrl
    pub seg_ctrl: seg_ctrl::SegCtrl,
    pub seg_ctrl_input: seg_ctrl::InputData,
    pub seg_ctrl_output: DriveCmd,
    pub seg_ctrl_status_rpt: seg_ctrl::StatusReport,

    // Transmit
    pub tx_loop: TxLoop,

    /// Frame sent this cycle
    pub tx_frame: Option<CanFrame>,

    // Odometry
    /// Copy of the shared odometry taken this cycle
    pub odom: OdomState,

    pub position: Position,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Create the data store for a run with the given parameters.
    pub fn new(params: &NavExecParams) -> Self {
        let mut ds = Self::default();

        ds.seg_ctrl_input.path = Path::new(&params.path);
        ds.tx_loop = TxLoop::new(params.tx_params());

        ds
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// The controller input persists between cycles, only the outputs are cleared.
    pub fn cycle_start(&mut self) {
        self.seg_ctrl_output = DriveCmd::stop();
        self.seg_ctrl_status_rpt = seg_ctrl::StatusReport::default();
        self.tx_frame = None;

        self.session_time_s = util::session::get_elapsed_seconds();
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
    }

    /// Route a message from the input feeds.
    pub fn apply_feed(&mut self, msg: FeedMsg) {
        match msg {
            FeedMsg::Waypoint { x, y } => {
                self.seg_ctrl_input.path.ingest(x, y);
            },
            FeedMsg::Range { dist } => {
                if self.seg_ctrl_input.range != dist {
                    debug!("Range now {}", dist);
                }
                self.seg_ctrl_input.range = dist;
            }
        }
    }

    /// Log a summary of the run.
    pub fn log_summary(&self) {
        let tx = self.tx_loop.stats();

        info!("Run summary:");
        info!("    Cycles: {}", self.num_cycles);
        info!(
            "    Frames sent: {} data, {} heartbeat, {} retries",
            tx.num_data, tx.num_heartbeats, tx.num_retries
        );
        info!(
            "    Segments completed: {}, finished: {}",
            self.seg_ctrl.seg_idx(),
            self.seg_ctrl.is_finished()
        );
        info!(
            "    Odometry: {:.1} mm, {:.4} rad",
            self.odom.dist_sum_mm, self.odom.head_sum_rad
        );
        info!(
            "    Position: ({:.3}, {:.3}) m",
            self.position.x_m, self.position.y_m
        );
    }
}
