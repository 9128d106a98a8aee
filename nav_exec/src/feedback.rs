//! # Feedback Listener
//!
//! The feedback listener runs in a background thread, receiving frames from the bus and folding
//! every drive velocity report into the shared odometry. Frames which aren't drive feedback are
//! discarded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use comms_if::eqpt::drive::DriveFeedback;
use crate::{bus::BusTransport, odom::SharedOdom};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval at which a stopping listener is checked for exit.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the listener, the `[feedback]` table of `nav_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackParams {
    /// Time a single receive waits for frames
    pub recv_timeout_ms: u64,

    /// Maximum number of frames taken in a single receive
    pub max_frames: usize,

    /// Period each velocity sample is assumed to hold for
    pub sample_period_s: f64,
}

/// Counts of the frames the listener has handled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub num_linear: u64,
    pub num_angular: u64,
    pub num_discarded: u64,
    pub num_recv_errors: u64,
}

/// Handle to a running feedback listener.
pub struct FeedbackListener {
    bg_jh: Option<JoinHandle<ListenerStats>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Could not spawn the listener thread: {0}")]
    SpawnError(std::io::Error),

    #[error("The listener did not exit within {0:?}")]
    JoinTimeout(Duration),

    #[error("The listener thread panicked")]
    ThreadPanicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            recv_timeout_ms: 100,
            max_frames: 3000,
            sample_period_s: 0.01,
        }
    }
}

impl FeedbackListener {
    /// Start listening for feedback on the given channel.
    pub fn start(
        bus: Arc<dyn BusTransport>,
        channel: u32,
        odom: SharedOdom,
        params: &FeedbackParams
    ) -> Result<Self, FeedbackError> {
        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();
        let params = params.clone();

        let bg_jh = thread::Builder::new()
            .name("feedback".into())
            .spawn(move || bg_thread(bus, channel, odom, params, bg_run_clone))
            .map_err(FeedbackError::SpawnError)?;

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run
        })
    }

    /// True while the listener thread is running.
    pub fn is_running(&self) -> bool {
        match self.bg_jh {
            Some(ref jh) => !jh.is_finished(),
            None => false
        }
    }

    /// Stop the listener, waiting at most `timeout` for it to exit.
    ///
    /// If the listener doesn't exit in time it is left to finish on its own.
    pub fn stop(mut self, timeout: Duration) -> Result<ListenerStats, FeedbackError> {
        self.bg_run.store(false, Ordering::Relaxed);

        let jh = match self.bg_jh.take() {
            Some(jh) => jh,
            None => return Ok(ListenerStats::default())
        };

        let deadline = Instant::now() + timeout;
        while !jh.is_finished() {
            if Instant::now() >= deadline {
                return Err(FeedbackError::JoinTimeout(timeout));
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        jh.join().map_err(|_| FeedbackError::ThreadPanicked)
    }
}

impl Drop for FeedbackListener {
    fn drop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, receives frames until the run flag is cleared.
fn bg_thread(
    bus: Arc<dyn BusTransport>,
    channel: u32,
    odom: SharedOdom,
    params: FeedbackParams,
    run: Arc<AtomicBool>
) -> ListenerStats {
    let timeout = Duration::from_millis(params.recv_timeout_ms);
    let mut stats = ListenerStats::default();

    while run.load(Ordering::Relaxed) {
        let frames = match bus.receive(channel, params.max_frames, timeout) {
            Ok(f) => f,
            Err(e) => {
                warn!("Error receiving feedback on CAN{}: {}", channel + 1, e);
                stats.num_recv_errors += 1;
                thread::sleep(timeout);
                continue
            }
        };

        if frames.is_empty() {
            continue
        }

        let mut od = odom.lock().expect("Odometry mutex poisoned");

        for frame in frames.iter() {
            match DriveFeedback::from_frame(frame) {
                Some(fb) => {
                    match fb {
                        DriveFeedback::Linear(_) => stats.num_linear += 1,
                        DriveFeedback::Angular(_) => stats.num_angular += 1
                    }
                    od.apply(fb, params.sample_period_s);
                },
                None => stats.num_discarded += 1
            }
        }
    }

    debug!("Feedback listener exiting: {:?}", stats);

    stats
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bus::{SimBus, ChannelConfig}, odom::OdomState};
    use comms_if::can::CanFrame;

    fn started_bus() -> Arc<SimBus> {
        let bus = Arc::new(SimBus::without_feedback());
        bus.open(4, 0).unwrap();
        bus.init_channel(0, &ChannelConfig::default()).unwrap();
        bus.start_channel(0).unwrap();
        bus
    }

    fn params() -> FeedbackParams {
        FeedbackParams {
            recv_timeout_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_listener_updates_odom() {
        let bus = started_bus();
        let odom = OdomState::new_shared();

        let listener = FeedbackListener::start(
            bus.clone(), 0, odom.clone(), &params()
        ).unwrap();
        assert!(listener.is_running());

        for _ in 0..10 {
            bus.inject_rx(0, CanFrame::new_data(0x581, DriveFeedback::Linear(1000).to_payload()));
        }
        bus.inject_rx(0, CanFrame::new_data(0x581, DriveFeedback::Angular(500).to_payload()));
        bus.inject_rx(0, CanFrame::new_data(0x581, [0x60, 0, 0, 0, 0, 0, 0, 0]));

        // Wait for the listener to work through the queue
        let deadline = Instant::now() + Duration::from_secs(2);
        while odom.lock().unwrap().angular_mrads == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));

        let stats = listener.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(stats.num_linear, 10);
        assert_eq!(stats.num_angular, 1);
        assert_eq!(stats.num_discarded, 1);

        let od = *odom.lock().unwrap();
        assert!((od.dist_sum_mm - 100.0).abs() < 1e-9);
        assert!((od.head_sum_rad - 0.005).abs() < 1e-9);
        assert_eq!(od.linear_mms, 1000);
    }

    #[test]
    fn test_listener_survives_receive_errors() {
        // Channel 1 is never started so every receive fails
        let bus = started_bus();
        let odom = OdomState::new_shared();

        let listener = FeedbackListener::start(bus, 1, odom, &params()).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(listener.is_running());

        let stats = listener.stop(Duration::from_secs(1)).unwrap();
        assert!(stats.num_recv_errors > 0);
        assert_eq!(stats.num_linear, 0);
    }
}
