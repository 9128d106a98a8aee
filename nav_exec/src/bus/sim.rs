//! # Simulated CAN Bus
//!
//! An in-process stand-in for the CAN adapter with a drive controller attached. Every demand
//! frame sent to the drive is answered with a feedback frame reporting the demanded velocity, so
//! the feedback path can be exercised without hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{HashMap, VecDeque},
    sync::{Condvar, Mutex},
    time::{Duration, Instant}
};
use log::trace;

use comms_if::{
    can::CanFrame,
    eqpt::drive::{
        DriveFeedback, DrivePayload, DATA_FRAME_ID,
        LINEAR_TARGET_SELECTOR, ANGULAR_TARGET_SELECTOR
    }
};
use super::{BusError, BusTransport, ChannelConfig, DeviceInfo};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Identifier the simulated drive answers with.
pub const FEEDBACK_FRAME_ID: u32 = 0x581;

/// Device type the simulated adapter reports as.
const SIM_DEVICE_TYPE: u32 = 4;

/// Number of channels on the simulated adapter.
const SIM_NUM_CHANNELS: u8 = 2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated adapter and drive controller.
pub struct SimBus {
    state: Mutex<SimState>,
    rx_ready: Condvar,
}

#[derive(Default)]
struct SimState {
    open: bool,
    configured: HashMap<u32, ChannelConfig>,
    started: Vec<u32>,
    rx: HashMap<u32, VecDeque<CanFrame>>,
    transmitted: Vec<(u32, CanFrame)>,

    /// Answer demands with feedback
    echo_feedback: bool,

    /// Number of successful transmits left before every transmit fails
    transmits_before_failure: Option<usize>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBus {
    /// Create a new simulated bus which answers demands with feedback.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                echo_feedback: true,
                ..Default::default()
            }),
            rx_ready: Condvar::new(),
        }
    }

    /// Create a simulated bus with no drive attached, nothing is ever received unless injected.
    pub fn without_feedback() -> Self {
        let bus = Self::new();
        bus.lock().echo_feedback = false;
        bus
    }

    /// Make every transmit after the next `count` successful ones fail.
    pub fn fail_transmit_after(&self, count: usize) {
        self.lock().transmits_before_failure = Some(count);
    }

    /// Queue a frame for reception on the given channel.
    pub fn inject_rx(&self, channel: u32, frame: CanFrame) {
        self.lock().rx.entry(channel).or_default().push_back(frame);
        self.rx_ready.notify_all();
    }

    /// All frames transmitted so far, along with the channel they were sent on.
    pub fn transmitted(&self) -> Vec<(u32, CanFrame)> {
        self.lock().transmitted.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Channels that are currently started, in start order.
    pub fn started_channels(&self) -> Vec<u32> {
        self.lock().started.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<SimState> {
        self.state.lock().expect("SimBus state mutex poisoned")
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimState {
    fn check_started(&self, channel: u32) -> Result<(), BusError> {
        if !self.open {
            return Err(BusError::NotOpen);
        }
        if !self.started.contains(&channel) {
            return Err(BusError::ChannelNotStarted(channel));
        }
        Ok(())
    }

    /// Build the drive's answer to a frame, if it answers at all.
    fn drive_response(&self, frame: &CanFrame) -> Option<CanFrame> {
        if !self.echo_feedback || frame.id != DATA_FRAME_ID {
            return None;
        }

        let payload = DrivePayload(frame.data);

        let fb = match payload.selector() {
            s if s == LINEAR_TARGET_SELECTOR => DriveFeedback::Linear(payload.value()),
            s if s == ANGULAR_TARGET_SELECTOR => DriveFeedback::Angular(payload.value()),
            _ => return None
        };

        Some(CanFrame::new_data(FEEDBACK_FRAME_ID, fb.to_payload()))
    }
}

impl BusTransport for SimBus {
    fn find_devices(&self) -> Result<Vec<DeviceInfo>, BusError> {
        Ok(vec![sim_device_info()])
    }

    fn open(&self, device_type: u32, device_index: u32) -> Result<(), BusError> {
        if device_type != SIM_DEVICE_TYPE || device_index != 0 {
            return Err(BusError::OpenFailed { device_type, device_index });
        }

        self.lock().open = true;
        Ok(())
    }

    fn board_info(&self) -> Result<DeviceInfo, BusError> {
        match self.lock().open {
            true => Ok(sim_device_info()),
            false => Err(BusError::NotOpen)
        }
    }

    fn init_channel(&self, channel: u32, config: &ChannelConfig) -> Result<(), BusError> {
        let mut state = self.lock();
        if !state.open {
            return Err(BusError::NotOpen);
        }
        if channel >= SIM_NUM_CHANNELS as u32 {
            return Err(BusError::InitFailed(channel));
        }

        state.configured.insert(channel, *config);
        Ok(())
    }

    fn start_channel(&self, channel: u32) -> Result<(), BusError> {
        let mut state = self.lock();
        if !state.open {
            return Err(BusError::NotOpen);
        }
        if !state.configured.contains_key(&channel) {
            return Err(BusError::StartFailed(channel));
        }

        if !state.started.contains(&channel) {
            state.started.push(channel);
        }
        Ok(())
    }

    fn transmit(&self, channel: u32, frames: &[CanFrame]) -> Result<usize, BusError> {
        let mut state = self.lock();
        state.check_started(channel)?;

        let mut num_sent = 0;

        for frame in frames {
            if let Some(n) = state.transmits_before_failure.as_mut() {
                if *n == 0 {
                    break;
                }
                *n -= 1;
            }

            trace!("SimBus CAN{} tx {:#x} {:02x?}", channel + 1, frame.id, frame.payload());
            state.transmitted.push((channel, *frame));

            if let Some(resp) = state.drive_response(frame) {
                state.rx.entry(channel).or_default().push_back(resp);
            }

            num_sent += 1;
        }

        drop(state);
        self.rx_ready.notify_all();

        Ok(num_sent)
    }

    fn receive(
        &self,
        channel: u32,
        max_frames: usize,
        timeout: Duration
    ) -> Result<Vec<CanFrame>, BusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            state.check_started(channel)?;

            let queue = state.rx.entry(channel).or_default();
            if !queue.is_empty() {
                let num = queue.len().min(max_frames);
                return Ok(queue.drain(..num).collect());
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            state = self.rx_ready
                .wait_timeout(state, deadline - now)
                .expect("SimBus state mutex poisoned")
                .0;
        }
    }

    fn reset_channel(&self, channel: u32) -> Result<(), BusError> {
        let mut state = self.lock();
        if !state.open {
            return Err(BusError::ResetFailed(channel));
        }

        state.started.retain(|&c| c != channel);
        state.rx.remove(&channel);
        Ok(())
    }

    fn close(&self) -> Result<(), BusError> {
        let mut state = self.lock();
        if !state.open {
            return Err(BusError::CloseFailed);
        }

        state.open = false;
        state.started.clear();
        state.configured.clear();
        drop(state);

        // Wake any receiver so it sees the adapter is gone
        self.rx_ready.notify_all();
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn sim_device_info() -> DeviceInfo {
    DeviceInfo {
        serial_number: String::from("SIM00001"),
        hw_type: String::from("SimBus"),
        firmware_version: 0x0100,
        num_channels: SIM_NUM_CHANNELS,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::drive::{DriveCmd, HEARTBEAT_FRAME_ID};

    fn started_bus() -> SimBus {
        let bus = SimBus::new();
        bus.open(4, 0).unwrap();
        bus.init_channel(0, &ChannelConfig::default()).unwrap();
        bus.start_channel(0).unwrap();
        bus
    }

    #[test]
    fn test_demands_are_answered() {
        let bus = started_bus();
        let [lin, ang] = DriveCmd::new(1000, -500).encode();

        assert_eq!(bus.transmit(0, &[lin.to_frame(DATA_FRAME_ID)]).unwrap(), 1);
        assert_eq!(bus.transmit(0, &[ang.to_frame(DATA_FRAME_ID)]).unwrap(), 1);
        assert_eq!(
            bus.transmit(0, &[DrivePayload::heartbeat().to_frame(HEARTBEAT_FRAME_ID)]).unwrap(),
            1
        );

        let rx = bus.receive(0, 3000, Duration::from_millis(10)).unwrap();
        let fb: Vec<_> = rx.iter().filter_map(DriveFeedback::from_frame).collect();
        assert_eq!(fb, vec![DriveFeedback::Linear(1000), DriveFeedback::Angular(-500)]);

        assert_eq!(bus.transmitted().len(), 3);
    }

    #[test]
    fn test_receive_limits_and_timeout() {
        let bus = started_bus();
        for _ in 0..5 {
            bus.inject_rx(0, CanFrame::new_data(0x123, [0; 8]));
        }

        assert_eq!(bus.receive(0, 3, Duration::from_millis(10)).unwrap().len(), 3);
        assert_eq!(bus.receive(0, 3, Duration::from_millis(10)).unwrap().len(), 2);

        let start = Instant::now();
        assert!(bus.receive(0, 3, Duration::from_millis(20)).unwrap().is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));

        assert!(matches!(
            bus.receive(1, 3, Duration::from_millis(1)),
            Err(BusError::ChannelNotStarted(1))
        ));
    }

    #[test]
    fn test_transmit_failure() {
        let bus = SimBus::without_feedback();
        bus.open(4, 0).unwrap();
        bus.init_channel(0, &ChannelConfig::default()).unwrap();
        bus.start_channel(0).unwrap();
        bus.fail_transmit_after(1);

        let frame = CanFrame::new_data(DATA_FRAME_ID, [0; 8]);
        assert_eq!(bus.transmit(0, &[frame]).unwrap(), 1);
        assert_eq!(bus.transmit(0, &[frame]).unwrap(), 0);

        // Without a drive nothing comes back
        assert!(bus.receive(0, 10, Duration::from_millis(1)).unwrap().is_empty());
    }
}
