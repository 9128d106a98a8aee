//! # CAN Bus Module
//!
//! The navigation software talks to the drive controller through a CAN adapter. The adapter's
//! vendor driver is abstracted behind the [`BusTransport`] trait so that the executable can be run
//! against the simulated drive in [`sim`] or against real hardware.
//!
//! The open and close sequences in this module bring every configured channel up and down in the
//! order the adapter expects.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};
use log::{error, info, warn};
use serde::Deserialize;

use comms_if::can::CanFrame;

pub use sim::SimBus;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A CAN adapter.
///
/// All methods take `&self`, implementors are shared between the transmit loop and the feedback
/// listener and must synchronise internally.
pub trait BusTransport: Send + Sync {
    /// List the adapters attached to the host.
    fn find_devices(&self) -> Result<Vec<DeviceInfo>, BusError>;

    /// Open the adapter of the given type and index.
    fn open(&self, device_type: u32, device_index: u32) -> Result<(), BusError>;

    /// Read the board information of the opened adapter.
    fn board_info(&self) -> Result<DeviceInfo, BusError>;

    /// Configure a channel.
    fn init_channel(&self, channel: u32, config: &ChannelConfig) -> Result<(), BusError>;

    /// Start a configured channel.
    fn start_channel(&self, channel: u32) -> Result<(), BusError>;

    /// Transmit frames on a channel, returning the number of frames actually sent.
    fn transmit(&self, channel: u32, frames: &[CanFrame]) -> Result<usize, BusError>;

    /// Receive up to `max_frames` frames from a channel, waiting at most `timeout` for the first.
    ///
    /// An empty vector means no frames arrived within the timeout.
    fn receive(
        &self,
        channel: u32,
        max_frames: usize,
        timeout: Duration
    ) -> Result<Vec<CanFrame>, BusError>;

    /// Reset a channel, stopping it.
    fn reset_channel(&self, channel: u32) -> Result<(), BusError>;

    /// Close the adapter.
    fn close(&self) -> Result<(), BusError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identification of a CAN adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub hw_type: String,

    /// Firmware version, major in the high byte and minor in the low byte.
    pub firmware_version: u16,

    pub num_channels: u8,
}

/// Acceptance filter and bit timing configuration of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    pub acc_code: u32,
    pub acc_mask: u32,

    /// Filter mode, 1 accepts all frames
    pub filter: u8,

    /// Bit timing registers, `0x00`/`0x1C` gives 500 kbps
    pub timing0: u8,
    pub timing1: u8,

    /// Channel mode, 0 is normal operation
    pub mode: u8,
}

/// Parameters of the bus, the `[bus]` table of `nav_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BusParams {
    /// Which transport implementation to use
    pub driver: BusDriver,

    pub device_type: u32,
    pub device_index: u32,

    /// Channel the drive demands are sent on
    pub tx_channel: u32,

    /// Channel the drive feedback is received on
    pub rx_channel: u32,

    /// All channels to bring up, in order
    pub channels: Vec<u32>,

    pub channel_config: ChannelConfig,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Available transport implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BusDriver {
    /// In-process simulated drive controller
    Sim,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("No CAN adapters were found")]
    NoDevices,

    #[error("Could not open adapter {device_type}/{device_index}")]
    OpenFailed {
        device_type: u32,
        device_index: u32
    },

    #[error("The adapter is not open")]
    NotOpen,

    #[error("Could not read the board information")]
    BoardInfoFailed,

    #[error("Could not initialise channel {0}")]
    InitFailed(u32),

    #[error("Could not start channel {0}")]
    StartFailed(u32),

    #[error("Channel {0} has not been started")]
    ChannelNotStarted(u32),

    #[error("Transmit failed on channel {0}")]
    TransmitFailed(u32),

    #[error("Receive failed on channel {0}")]
    ReceiveFailed(u32),

    #[error("Could not reset channel {0}")]
    ResetFailed(u32),

    #[error("Could not close the adapter")]
    CloseFailed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DeviceInfo {
    /// Firmware version in the `Vx.yz` form.
    pub fn firmware_str(&self) -> String {
        format!(
            "V{:x}.{:02x}",
            self.firmware_version >> 8,
            self.firmware_version & 0xFF
        )
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            acc_code: 0,
            acc_mask: 0xFFFF_FFFF,
            filter: 1,
            timing0: 0x00,
            timing1: 0x1C,
            mode: 0,
        }
    }
}

impl Default for BusParams {
    fn default() -> Self {
        Self {
            driver: BusDriver::Sim,
            device_type: 4,
            device_index: 0,
            tx_channel: 0,
            rx_channel: 0,
            channels: vec![0, 1],
            channel_config: ChannelConfig::default(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Discover, open and start the adapter.
///
/// Any failure here is fatal to startup, nothing is retried.
pub fn open_bus(bus: &dyn BusTransport, params: &BusParams) -> Result<(), BusError> {
    let devices = bus.find_devices()?;
    if devices.is_empty() {
        return Err(BusError::NoDevices);
    }

    info!("Found {} CAN adapter(s):", devices.len());
    for (i, d) in devices.iter().enumerate() {
        info!(
            "    [{}] {} (serial {}, firmware {})",
            i, d.hw_type, d.serial_number, d.firmware_str()
        );
    }

    bus.open(params.device_type, params.device_index)?;
    info!("Opened adapter {}/{}", params.device_type, params.device_index);

    let mut started = Vec::with_capacity(params.channels.len());

    if let Err(e) = start_channels(bus, params, &mut started) {
        error!("CAN bus startup failed, closing adapter: {}", e);

        for &channel in started.iter() {
            if let Err(re) = bus.reset_channel(channel) {
                warn!("Could not reset CAN{}: {}", channel + 1, re);
            }
        }
        if let Err(ce) = bus.close() {
            warn!("Could not close the adapter: {}", ce);
        }

        return Err(e);
    }

    Ok(())
}

/// Read the board info then init and start every channel, recording each channel started.
fn start_channels(
    bus: &dyn BusTransport,
    params: &BusParams,
    started: &mut Vec<u32>
) -> Result<(), BusError> {
    let board = bus.board_info()?;
    info!(
        "Board info: {} serial {}, firmware {}, {} channel(s)",
        board.hw_type, board.serial_number, board.firmware_str(), board.num_channels
    );

    for &channel in params.channels.iter() {
        bus.init_channel(channel, &params.channel_config)?;
        bus.start_channel(channel)?;
        started.push(channel);
        info!("CAN{} initialised and started", channel + 1);
    }

    Ok(())
}

/// Reset every channel and close the adapter.
///
/// The sequence carries on past errors so the adapter is always closed, the first error is
/// returned.
pub fn close_bus(
    bus: &dyn BusTransport,
    params: &BusParams,
    reset_delay: Duration
) -> Result<(), BusError> {
    let mut first_err = None;

    for &channel in params.channels.iter() {
        match bus.reset_channel(channel) {
            Ok(()) => info!("CAN{} reset", channel + 1),
            Err(e) => {
                warn!("Could not reset CAN{}: {}", channel + 1, e);
                first_err.get_or_insert(e);
            }
        }
        thread::sleep(reset_delay);
    }

    match bus.close() {
        Ok(()) => info!("Adapter closed"),
        Err(e) => {
            warn!("Could not close the adapter: {}", e);
            first_err.get_or_insert(e);
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_firmware_str() {
        let info = DeviceInfo {
            serial_number: "X".into(),
            hw_type: "Y".into(),
            firmware_version: 0x0312,
            num_channels: 2
        };
        assert_eq!(info.firmware_str(), "V3.12");
    }

    #[test]
    fn test_open_close_sequence() {
        let bus = SimBus::new();
        let params = BusParams::default();

        // Nothing can be sent before the bus is brought up
        let frame = CanFrame::new_data(0x601, [0; 8]);
        assert!(bus.transmit(0, &[frame]).is_err());

        open_bus(&bus, &params).unwrap();
        assert!(bus.is_open());
        assert_eq!(bus.started_channels(), vec![0, 1]);
        assert_eq!(bus.transmit(0, &[frame]).unwrap(), 1);

        close_bus(&bus, &params, Duration::from_millis(1)).unwrap();
        assert!(!bus.is_open());
        assert!(bus.started_channels().is_empty());
    }

    #[test]
    fn test_open_unknown_device() {
        let bus = SimBus::new();
        let params = BusParams {
            device_index: 3,
            ..Default::default()
        };

        assert!(matches!(
            open_bus(&bus, &params),
            Err(BusError::OpenFailed { device_index: 3, .. })
        ));
    }

    #[test]
    fn test_failed_start_closes_adapter() {
        let bus = SimBus::new();
        let params = BusParams {
            channels: vec![0, 5],
            ..Default::default()
        };

        assert!(matches!(open_bus(&bus, &params), Err(BusError::InitFailed(5))));
        assert!(!bus.is_open());
        assert!(bus.started_channels().is_empty());

        // The adapter can be brought up again afterwards
        open_bus(&bus, &BusParams::default()).unwrap();
        assert_eq!(bus.started_channels(), vec![0, 1]);
    }
}
