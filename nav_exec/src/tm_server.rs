//! # TM Server

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use comms_if::net::{MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions, zmq};
use util::archive::{Archived, Archiver, ArchiveError};
use util::session::Session;

use crate::data_store::DataStore;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TmServer {
    socket: MonitoredSocket
}

/// Telemetry archive, written every cycle whether or not the server is running.
#[derive(Default)]
pub struct TmArchive {
    tm: Option<NavTm>,
    arch_tm: Archiver
}

/// Telemetry packet that is output by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavTm {
    pub cycle: u64,
    pub session_time_s: f64,

    /// Reported linear velocity
    pub linear_mms: i16,

    /// Reported angular velocity
    pub angular_mrads: i16,

    /// Demanded linear velocity
    pub dem_linear_mms: i16,

    /// Demanded angular velocity
    pub dem_angular_mrads: i16,

    pub position_x_m: f64,
    pub position_y_m: f64,

    pub seg_idx: usize,
    pub finished: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send telemetry: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Create a new instance of the TM Server.
    ///
    /// This function will not block until a subscriber connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TmServerError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            bind: true,
            connect_timeout: 1000,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            socket_options,
            &params.tm_endpoint
        ).map_err(TmServerError::SocketError)?;

        Ok(Self {
            socket
        })
    }

    pub fn send(&mut self, tm: &NavTm) -> Result<(), TmServerError> {
        let packet_string = serde_json::to_string(tm)
            .map_err(TmServerError::SerializationError)?;

        self.socket.send(&packet_string, 0)
            .map_err(TmServerError::SendError)
    }
}

impl NavTm {
    pub fn from_datastore(ds: &DataStore) -> Self {
        Self {
            cycle: ds.num_cycles,
            session_time_s: ds.session_time_s,
            linear_mms: ds.odom.linear_mms,
            angular_mrads: ds.odom.angular_mrads,
            dem_linear_mms: ds.seg_ctrl_output.linear_mms,
            dem_angular_mrads: ds.seg_ctrl_output.angular_mrads,
            position_x_m: ds.position.x_m,
            position_y_m: ds.position.y_m,
            seg_idx: ds.seg_ctrl_status_rpt.seg_idx,
            finished: ds.seg_ctrl_status_rpt.finished,
        }
    }
}

impl TmArchive {
    /// Open the telemetry archive in the session.
    pub fn new(session: &Session) -> Result<Self, ArchiveError> {
        Ok(Self {
            tm: None,
            arch_tm: Archiver::from_path(session, "nav_tm.csv")?
        })
    }

    /// Set the telemetry to be written on the next `write`.
    pub fn set(&mut self, tm: NavTm) {
        self.tm = Some(tm);
    }
}

impl Archived for TmArchive {
    fn write(&mut self) -> Result<(), ArchiveError> {
        match self.tm.take() {
            Some(tm) => self.arch_tm.serialise(tm),
            None => Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::NavExecParams;
    use comms_if::eqpt::drive::DriveCmd;

    #[test]
    fn test_tm_from_datastore() {
        let mut ds = DataStore::new(&NavExecParams::default());
        ds.num_cycles = 12;
        ds.seg_ctrl_output = DriveCmd::new(0, -500);
        ds.odom.linear_mms = 990;
        ds.position.x_m = 1.5;

        let tm = NavTm::from_datastore(&ds);
        assert_eq!(tm.cycle, 12);
        assert_eq!(tm.dem_angular_mrads, -500);
        assert_eq!(tm.linear_mms, 990);
        assert_eq!(tm.position_x_m, 1.5);

        let json = serde_json::to_string(&tm).unwrap();
        let back: NavTm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tm);
    }
}
