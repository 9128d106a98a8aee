//! # Transmit Loop
//!
//! Schedules the frames sent to the drive controller. One frame is sent per cycle: the linear and
//! angular demand rows alternate, and every `heartbeat_period_cycles`-th cycle carries the
//! heartbeat in place of a demand row.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use serde::Serialize;

use comms_if::{
    can::CanFrame,
    eqpt::drive::{DriveCmd, DrivePayload, DATA_FRAME_ID, HEARTBEAT_FRAME_ID}
};
use crate::bus::{BusError, BusTransport};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the transmit loop.
#[derive(Debug, Clone, Copy)]
pub struct TxParams {
    /// Channel frames are sent on
    pub channel: u32,

    /// Number of cycles between heartbeats
    pub heartbeat_period_cycles: u32,

    /// Number of times a failed transmit is retried before the failure is returned
    pub retry_limit: u32,
}

/// Frame scheduler and sender.
#[derive(Debug)]
pub struct TxLoop {
    params: TxParams,

    /// Cycles since the last heartbeat
    hb_counter: u32,

    /// Demand row sent next, 0 is linear and 1 angular
    row_idx: usize,

    stats: TxStats,
}

/// Counts of the frames sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxStats {
    pub num_data: u64,
    pub num_heartbeats: u64,
    pub num_retries: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("Frame {id:#x} was not accepted by the bus after {attempts} attempt(s)")]
    NotSent {
        id: u32,
        attempts: u32
    },

    #[error("Bus error while sending frame {id:#x}: {source}")]
    BusError {
        id: u32,
        source: BusError
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for TxParams {
    fn default() -> Self {
        Self {
            channel: 0,
            heartbeat_period_cycles: 20,
            retry_limit: 0,
        }
    }
}

impl Default for TxLoop {
    fn default() -> Self {
        Self::new(TxParams::default())
    }
}

impl TxLoop {
    pub fn new(params: TxParams) -> Self {
        Self {
            params,
            hb_counter: 0,
            row_idx: 0,
            stats: TxStats::default(),
        }
    }

    /// Get the frame to send this cycle for the given demand, advancing the schedule.
    pub fn next_frame(&mut self, cmd: &DriveCmd) -> CanFrame {
        self.hb_counter += 1;

        let frame = if self.hb_counter >= self.params.heartbeat_period_cycles {
            self.hb_counter = 0;
            DrivePayload::heartbeat().to_frame(HEARTBEAT_FRAME_ID)
        }
        else {
            cmd.encode()[self.row_idx].to_frame(DATA_FRAME_ID)
        };

        // Rows alternate on heartbeat cycles too
        self.row_idx = (self.row_idx + 1) % 2;

        frame
    }

    /// Send a frame, retrying up to the retry limit.
    pub fn send(&mut self, bus: &dyn BusTransport, frame: &CanFrame) -> Result<(), TxError> {
        let attempts = self.params.retry_limit + 1;
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.stats.num_retries += 1;
                warn!("Retrying frame {:#x} (attempt {} of {})", frame.id, attempt + 1, attempts);
            }

            match bus.transmit(self.params.channel, std::slice::from_ref(frame)) {
                Ok(1) => {
                    match frame.id {
                        HEARTBEAT_FRAME_ID => self.stats.num_heartbeats += 1,
                        _ => self.stats.num_data += 1
                    }
                    trace!("Sent {:#x} {:02x?}", frame.id, frame.payload());
                    return Ok(())
                },
                Ok(_) => last_err = None,
                Err(e) => last_err = Some(e)
            }
        }

        match last_err {
            Some(source) => Err(TxError::BusError { id: frame.id, source }),
            None => Err(TxError::NotSent { id: frame.id, attempts })
        }
    }

    /// Schedule and send the frame for this cycle, returning the frame sent.
    pub fn tick(&mut self, bus: &dyn BusTransport, cmd: &DriveCmd) -> Result<CanFrame, TxError> {
        let frame = self.next_frame(cmd);
        self.send(bus, &frame)?;
        Ok(frame)
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bus::{ChannelConfig, SimBus};
    use comms_if::eqpt::drive::{HEARTBEAT_PAYLOAD, LINEAR_TARGET_SELECTOR, ANGULAR_TARGET_SELECTOR};

    fn started_bus() -> SimBus {
        let bus = SimBus::without_feedback();
        bus.open(4, 0).unwrap();
        bus.init_channel(0, &ChannelConfig::default()).unwrap();
        bus.start_channel(0).unwrap();
        bus
    }

    #[test]
    fn test_heartbeat_schedule() {
        let mut tx = TxLoop::default();
        let cmd = DriveCmd::new(1000, 0);

        let frames: Vec<CanFrame> = (0..100).map(|_| tx.next_frame(&cmd)).collect();

        for (i, f) in frames.iter().enumerate() {
            if i % 20 == 19 {
                assert_eq!(f.id, HEARTBEAT_FRAME_ID, "tick {}", i);
                assert_eq!(f.data, HEARTBEAT_PAYLOAD);
            }
            else {
                assert_eq!(f.id, DATA_FRAME_ID, "tick {}", i);
            }
        }

        // Exactly one heartbeat in every 20 tick window
        for window in frames.chunks(20) {
            assert_eq!(window.iter().filter(|f| f.id == HEARTBEAT_FRAME_ID).count(), 1);
        }
    }

    #[test]
    fn test_rows_alternate_through_heartbeats() {
        let mut tx = TxLoop::default();
        let cmd = DriveCmd::new(0, -500);

        let frames: Vec<CanFrame> = (0..42).map(|_| tx.next_frame(&cmd)).collect();

        for (i, f) in frames.iter().enumerate() {
            if f.id == HEARTBEAT_FRAME_ID {
                continue;
            }
            let payload = DrivePayload(f.data);
            match i % 2 {
                0 => assert_eq!(payload.selector(), LINEAR_TARGET_SELECTOR, "tick {}", i),
                _ => {
                    assert_eq!(payload.selector(), ANGULAR_TARGET_SELECTOR, "tick {}", i);
                    assert_eq!(payload.value(), -500);
                }
            }
        }

        // Tick 19 was the heartbeat in place of an angular row, tick 20 goes back to linear
        assert_eq!(DrivePayload(frames[20].data).selector(), LINEAR_TARGET_SELECTOR);
    }

    #[test]
    fn test_send_and_stats() {
        let bus = started_bus();
        let mut tx = TxLoop::default();

        for _ in 0..40 {
            tx.tick(&bus, &DriveCmd::stop()).unwrap();
        }

        assert_eq!(bus.transmitted().len(), 40);
        assert_eq!(tx.stats().num_heartbeats, 2);
        assert_eq!(tx.stats().num_data, 38);
        assert_eq!(tx.stats().num_retries, 0);
    }

    #[test]
    fn test_send_failure_is_returned() {
        let bus = started_bus();
        bus.fail_transmit_after(3);
        let mut tx = TxLoop::default();

        for _ in 0..3 {
            tx.tick(&bus, &DriveCmd::stop()).unwrap();
        }
        assert!(matches!(
            tx.tick(&bus, &DriveCmd::stop()),
            Err(TxError::NotSent { id: DATA_FRAME_ID, attempts: 1 })
        ));
    }

    #[test]
    fn test_retries() {
        let bus = started_bus();
        bus.fail_transmit_after(0);
        let mut tx = TxLoop::new(TxParams {
            retry_limit: 2,
            ..Default::default()
        });

        assert!(matches!(
            tx.tick(&bus, &DriveCmd::stop()),
            Err(TxError::NotSent { attempts: 3, .. })
        ));
        assert_eq!(tx.stats().num_retries, 2);

        // Unstarted channel surfaces the bus error
        let mut tx = TxLoop::new(TxParams {
            channel: 1,
            ..Default::default()
        });
        assert!(matches!(
            tx.tick(&bus, &DriveCmd::stop()),
            Err(TxError::BusError { source: BusError::ChannelNotStarted(1), .. })
        ));
    }
}
