//! Implementations for the SegCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::{Params, SegCtrlError, SegCtrlInitError};
use crate::path::{Path, Waypoint};
use comms_if::eqpt::drive::DriveCmd;
use util::{
    params,
    maths::{norm, signed_by},
    module::State,
    archive::{Archived, Archiver, ArchiveError},
    session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Segment control module state
#[derive(Default)]
pub struct SegCtrl {

    pub(crate) params: Params,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    phase: ControlPhase,

    /// True once the current segment's targets have been calculated
    seg_entered: bool,

    /// Index of the segment being driven, which starts at `path[seg_idx]`
    seg_idx: usize,

    target_head_rad: f64,
    target_dist_mm: f64,

    /// Estimated absolute heading, carried over between segments
    open_loop_head_rad: f64,

    /// Estimated distance driven along the current segment
    open_loop_dist_mm: f64,

    pause_remaining: u32,

    finished: bool,

    /// Heading change needed at the goal, never driven
    final_head_adj_rad: Option<f64>,
}

/// Input data to Segment Control.
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// The path to drive along
    pub path: Path,

    /// Latest obstacle range reading, zero until the sensor first reports
    pub range: i32,
}

/// Status report for SegCtrl processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    pub phase: ControlPhase,
    pub seg_idx: usize,

    /// Remaining heading change of the current segment
    pub head_err_rad: f64,

    /// Remaining distance of the current segment
    pub dist_err_mm: f64,

    /// The reason the vehicle is being held still, if it is
    pub safety_cause: Option<SafetyCause>,

    pub pause_remaining: u32,
    pub finished: bool,
    pub final_head_adj_rad: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Phase of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlPhase {
    /// Turning on the spot towards the end of the segment
    Rotating,

    /// Driving straight towards the end of the segment
    Translating,
}

/// Reasons for a safety stop, in order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SafetyCause {
    PathNotStarted,
    ObstacleTooClose,
    AllSegmentsFinished,
    Pausing,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ControlPhase {
    fn default() -> Self {
        ControlPhase::Rotating
    }
}

impl State for SegCtrl {
    type InitData = &'static str;
    type InitError = SegCtrlInitError;

    type InputData = InputData;
    type OutputData = DriveCmd;
    type StatusReport = StatusReport;
    type ProcError = SegCtrlError;

    /// Initialise the SegCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        self.params = params::load(init_data)
            .map_err(SegCtrlInitError::ParamLoadError)?;

        std::fs::create_dir_all(session.arch_root.join("seg_ctrl"))
            .map_err(|e| SegCtrlInitError::ArchiveError(ArchiveError::FileError(e)))?;

        self.arch_report = Archiver::from_path(session, "seg_ctrl/status_report.csv")
            .map_err(SegCtrlInitError::ArchiveError)?;

        Ok(())
    }

    /// Perform cyclic processing of Segment Control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        if let Some(cause) = self.safety_cause(input_data) {
            if self.pause_remaining > 0 {
                self.pause_remaining -= 1;
            }

            self.update_report(Some(cause));
            trace!("SegCtrl safety stop: {:?}", cause);

            return Ok((DriveCmd::stop(), self.report));
        }

        let path = &input_data.path;

        if path.len() < 2 {
            self.finished = true;
            self.update_report(None);
            return Err(SegCtrlError::PathTooShort(path.len()));
        }

        if !self.seg_entered {
            match path.segment(self.seg_idx) {
                Some((start, end)) => self.enter_segment(start, end, path),
                None => {
                    // Only reachable if points were appended after the path was finished with
                    warn!("No segment starts at point {}, stopping", self.seg_idx);
                    self.finished = true;
                    self.update_report(Some(SafetyCause::AllSegmentsFinished));
                    return Ok((DriveCmd::stop(), self.report));
                }
            }
        }

        let cmd = match self.phase {
            ControlPhase::Rotating => self.rotate(),
            ControlPhase::Translating => self.translate(path)
        };

        self.update_report(None);

        trace!("SegCtrl output: {:?}", cmd);

        Ok((cmd, self.report))
    }
}

impl Archived for SegCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

impl SegCtrl {
    /// Create a new instance with the given parameters and no archive.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    pub fn seg_idx(&self) -> usize {
        self.seg_idx
    }

    /// True once every segment of the path has been driven.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn open_loop_head_rad(&self) -> f64 {
        self.open_loop_head_rad
    }

    pub fn open_loop_dist_mm(&self) -> f64 {
        self.open_loop_dist_mm
    }

    pub fn final_head_adj_rad(&self) -> Option<f64> {
        self.final_head_adj_rad
    }

    /// The most recent status report.
    pub fn report(&self) -> StatusReport {
        self.report
    }

    /// Get the highest precedence reason to hold the vehicle still, if any.
    fn safety_cause(&self, input_data: &InputData) -> Option<SafetyCause> {
        if !input_data.path.is_complete() {
            Some(SafetyCause::PathNotStarted)
        }
        else if input_data.range < self.params.safety_range_threshold {
            Some(SafetyCause::ObstacleTooClose)
        }
        else if self.finished {
            Some(SafetyCause::AllSegmentsFinished)
        }
        else if self.pause_remaining > 0 {
            Some(SafetyCause::Pausing)
        }
        else {
            None
        }
    }

    /// Calculate the targets of a new segment.
    fn enter_segment(&mut self, start: Waypoint, end: Waypoint, path: &Path) {
        let dx = end.x_m - start.x_m;
        let dy = end.y_m - start.y_m;

        self.target_head_rad = dy.atan2(dx);
        self.target_dist_mm = 1000.0 * norm(&start.as_array(), &end.as_array()).unwrap_or(0.0);
        self.open_loop_dist_mm = 0.0;
        self.phase = ControlPhase::Rotating;
        self.seg_entered = true;

        info!(
            "Segment {}: ({:.3}, {:.3}) -> ({:.3}, {:.3}) m, heading {:.4} rad, distance {:.1} mm",
            self.seg_idx,
            start.x_m, start.y_m,
            end.x_m, end.y_m,
            self.target_head_rad,
            self.target_dist_mm
        );

        if path.is_goal(&end) {
            self.final_head_adj_rad = Some(-self.open_loop_head_rad);
            info!(
                "Final segment, heading adjustment at goal would be {:.4} rad",
                -self.open_loop_head_rad
            );
        }
    }

    /// Turn on the spot towards the target heading.
    fn rotate(&mut self) -> DriveCmd {
        let err = self.target_head_rad - self.open_loop_head_rad;

        if err.abs() > self.params.head_threshold_rad {
            let rate_mrads = signed_by(err, self.params.rotate_rate_mrads as f64);
            self.open_loop_head_rad += rate_mrads * 0.001 * self.params.open_loop_period_s;

            DriveCmd::new(0, rate_mrads as i16)
        }
        else {
            debug!(
                "Rotation complete, open loop heading {:.4} rad",
                self.open_loop_head_rad
            );
            self.phase = ControlPhase::Translating;

            DriveCmd::stop()
        }
    }

    /// Drive straight towards the end of the segment.
    fn translate(&mut self, path: &Path) -> DriveCmd {
        let err = self.target_dist_mm - self.open_loop_dist_mm;

        if err.abs() > self.params.dist_threshold_mm
            && self.open_loop_dist_mm < self.params.dist_cap_mm
        {
            self.open_loop_dist_mm +=
                self.params.translate_rate_mms as f64 * self.params.open_loop_period_s;

            DriveCmd::new(self.params.translate_rate_mms, 0)
        }
        else {
            self.complete_segment(path);

            DriveCmd::stop()
        }
    }

    /// Move on to the next segment, or finish if this was the last one.
    fn complete_segment(&mut self, path: &Path) {
        info!(
            "Segment {} complete, open loop distance {:.1} mm",
            self.seg_idx, self.open_loop_dist_mm
        );

        self.open_loop_dist_mm = 0.0;
        self.seg_idx += 1;
        self.seg_entered = false;
        self.phase = ControlPhase::Rotating;
        self.pause_remaining = self.params.pause_cycles;

        if self.seg_idx + 1 >= path.len() {
            self.finished = true;
            info!("All segments finished");

            if let Some(adj) = self.final_head_adj_rad {
                info!("Final heading adjustment of {:.4} rad is not applied", adj);
            }
        }
    }

    fn update_report(&mut self, safety_cause: Option<SafetyCause>) {
        self.report = StatusReport {
            phase: self.phase,
            seg_idx: self.seg_idx,
            head_err_rad: self.target_head_rad - self.open_loop_head_rad,
            dist_err_mm: self.target_dist_mm - self.open_loop_dist_mm,
            safety_cause,
            pause_remaining: self.pause_remaining,
            finished: self.finished,
            final_head_adj_rad: self.final_head_adj_rad,
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn input(points: &[(i32, i32)], range: i32) -> InputData {
        let mut path = Path::default();
        for &(x, y) in points {
            path.ingest(x, y);
        }

        InputData { path, range }
    }

    /// Run until finished, returning every command issued.
    fn run_to_finish(sc: &mut SegCtrl, input: &InputData) -> Vec<DriveCmd> {
        let mut cmds = Vec::new();

        for _ in 0..10_000 {
            let (cmd, _) = sc.proc(input).unwrap();
            cmds.push(cmd);
            if sc.is_finished() {
                break;
            }
        }

        assert!(sc.is_finished());
        cmds
    }

    #[test]
    fn test_safety_precedence() {
        let mut sc = SegCtrl::new(Params::default());

        // Incomplete path wins over a close obstacle
        let (cmd, rpt) = sc.proc(&input(&[(2, 2)], 0)).unwrap();
        assert!(cmd.is_stop());
        assert_eq!(rpt.safety_cause, Some(SafetyCause::PathNotStarted));

        // Range defaults to zero, so a complete path still waits for the sensor
        let mut inp = input(&[(2, 2), (95, 95)], 0);
        let (cmd, rpt) = sc.proc(&inp).unwrap();
        assert!(cmd.is_stop());
        assert_eq!(rpt.safety_cause, Some(SafetyCause::ObstacleTooClose));

        inp.range = 49;
        assert_eq!(sc.proc(&inp).unwrap().1.safety_cause, Some(SafetyCause::ObstacleTooClose));

        inp.range = 50;
        let (cmd, rpt) = sc.proc(&inp).unwrap();
        assert_eq!(rpt.safety_cause, None);
        assert_eq!(cmd, DriveCmd::new(0, 500));
    }

    #[test]
    fn test_single_segment_run() {
        let mut sc = SegCtrl::new(Params::default());
        let inp = input(&[(2, 2), (95, 95)], 120);

        let cmds = run_to_finish(&mut sc, &inp);

        let num_rotate = cmds.iter().filter(|c| **c == DriveCmd::new(0, 500)).count();
        let num_translate = cmds.iter().filter(|c| **c == DriveCmd::new(1000, 0)).count();

        // Only rotate, stop and translate commands are issued
        assert_eq!(num_rotate + num_translate + 2, cmds.len());
        assert!((130..=145).contains(&num_rotate), "rotate ticks: {}", num_rotate);
        assert!((640..=656).contains(&num_translate), "translate ticks: {}", num_translate);

        // Rotation, then exactly one stop, then translation, then a final stop
        assert!(cmds[..num_rotate].iter().all(|c| *c == DriveCmd::new(0, 500)));
        assert!(cmds[num_rotate].is_stop());
        assert!(cmds[num_rotate + 1..cmds.len() - 1].iter().all(|c| *c == DriveCmd::new(1000, 0)));
        assert!(cmds[cmds.len() - 1].is_stop());

        assert!((sc.open_loop_head_rad() - FRAC_PI_4).abs() <= 0.1);
        assert_eq!(sc.open_loop_dist_mm(), 0.0);
        assert_eq!(sc.final_head_adj_rad(), Some(0.0));

        // Finished controller only ever stops
        for _ in 0..10 {
            let (cmd, rpt) = sc.proc(&inp).unwrap();
            assert!(cmd.is_stop());
            assert_eq!(rpt.safety_cause, Some(SafetyCause::AllSegmentsFinished));
        }
    }

    #[test]
    fn test_distance_cap() {
        let mut sc = SegCtrl::new(Params::default());

        // 20 m along x, longer than the cap
        let mut path = Path::new(&crate::path::PathParams {
            scale_m: 0.05,
            goal_m: [20.0, 0.0]
        });
        path.ingest(0, 0);
        path.ingest(400, 0);
        let inp = InputData { path, range: 120 };

        let mut max_dist: f64 = 0.0;
        while !sc.is_finished() {
            sc.proc(&inp).unwrap();
            max_dist = max_dist.max(sc.open_loop_dist_mm());
        }

        assert!(max_dist <= 10_000.0 + 1e-6);
        assert!(max_dist >= 10_000.0 - 10.0 - 1e-6);
    }

    #[test]
    fn test_multi_segment_pause_and_heading() {
        let mut sc = SegCtrl::new(Params::default());
        let inp = input(&[(2, 2), (2, 42), (95, 95)], 120);

        // First segment points along +y
        let mut cmds = Vec::new();
        while sc.seg_idx() == 0 {
            cmds.push(sc.proc(&inp).unwrap().0);
        }
        assert!(cmds.iter().all(|c| c.angular_mrads >= 0));
        assert!((sc.open_loop_head_rad() - FRAC_PI_2).abs() <= 0.1);
        assert!(!sc.is_finished());

        // Exactly one pause window follows
        for i in 0..200 {
            let (cmd, rpt) = sc.proc(&inp).unwrap();
            assert!(cmd.is_stop());
            assert_eq!(rpt.safety_cause, Some(SafetyCause::Pausing), "tick {}", i);
        }

        // Second segment heads back towards +x so turns the other way
        let (cmd, rpt) = sc.proc(&inp).unwrap();
        assert_eq!(rpt.safety_cause, None);
        assert_eq!(cmd, DriveCmd::new(0, -500));

        // Heading estimate persisted across the segment boundary
        let adj = sc.final_head_adj_rad().unwrap();
        assert!(adj < -1.4 && adj > -1.6);

        run_to_finish(&mut sc, &inp);
        assert_eq!(sc.seg_idx(), 2);
    }

    #[test]
    fn test_obstacle_interrupts_translation() {
        let mut sc = SegCtrl::new(Params::default());
        let mut inp = input(&[(2, 2), (95, 95)], 120);

        while sc.phase() != ControlPhase::Translating {
            sc.proc(&inp).unwrap();
        }
        sc.proc(&inp).unwrap();
        let dist = sc.open_loop_dist_mm();

        inp.range = 10;
        for _ in 0..50 {
            let (cmd, rpt) = sc.proc(&inp).unwrap();
            assert!(cmd.is_stop());
            assert_eq!(rpt.safety_cause, Some(SafetyCause::ObstacleTooClose));
        }
        assert_eq!(sc.open_loop_dist_mm(), dist);

        inp.range = 120;
        assert_eq!(sc.proc(&inp).unwrap().0, DriveCmd::new(1000, 0));
    }

    #[test]
    fn test_obstacle_interrupts_rotation() {
        let mut sc = SegCtrl::new(Params::default());
        let mut inp = input(&[(2, 2), (95, 95)], 120);

        for _ in 0..20 {
            assert_eq!(sc.proc(&inp).unwrap().0, DriveCmd::new(0, 500));
        }
        let head = sc.open_loop_head_rad();

        inp.range = 49;
        for _ in 0..50 {
            let (cmd, rpt) = sc.proc(&inp).unwrap();
            assert!(cmd.is_stop());
            assert_eq!(rpt.safety_cause, Some(SafetyCause::ObstacleTooClose));
            assert_eq!(rpt.phase, ControlPhase::Rotating);
        }
        assert_eq!(sc.open_loop_head_rad(), head);

        inp.range = 50;
        assert_eq!(sc.proc(&inp).unwrap().0, DriveCmd::new(0, 500));
        assert_eq!(sc.phase(), ControlPhase::Rotating);
    }

    #[test]
    fn test_path_too_short() {
        let mut sc = SegCtrl::new(Params::default());
        let inp = input(&[(95, 95)], 120);

        assert!(matches!(sc.proc(&inp), Err(SegCtrlError::PathTooShort(1))));
        assert!(sc.is_finished());

        let (cmd, rpt) = sc.proc(&inp).unwrap();
        assert!(cmd.is_stop());
        assert_eq!(rpt.safety_cause, Some(SafetyCause::AllSegmentsFinished));
    }
}
