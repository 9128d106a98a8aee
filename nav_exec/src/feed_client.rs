//! # Feed Client
//!
//! Subscribes to the waypoint and range feeds published on the network.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;

use comms_if::{
    feed::FeedMsg,
    net::{zmq, MonitoredSocket, SocketOptions, MonitoredSocketError, NetParams}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Feed client
pub struct FeedClient {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a message from the feed: {0}")]
    RecvError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FeedClient {

    /// Create a new instance of the feed client.
    ///
    /// This function will not block until the publisher connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, FeedClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            linger: 1,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            socket_options,
            &params.feed_endpoint
        ).map_err(FeedClientError::SocketError)?;

        Ok(Self {
            socket
        })
    }

    /// Check if the client is connected to the publisher
    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }

    /// Receive every message that is waiting, without blocking.
    ///
    /// Messages which can't be parsed are dropped with a warning.
    pub fn receive_all(&self) -> Result<Vec<FeedMsg>, FeedClientError> {
        let mut msgs = Vec::new();

        loop {
            let msg_str = match self.socket.recv_string(zmq::DONTWAIT) {
                Ok(Ok(s)) => s,
                Ok(Err(_)) => {
                    warn!("Non UTF-8 message from the feed");
                    continue
                },
                // Nothing left to read
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => return Err(FeedClientError::RecvError(e))
            };

            match FeedMsg::from_json(&msg_str) {
                Ok(m) => msgs.push(m),
                Err(e) => warn!("Could not parse feed message {:?}: {}", msg_str, e)
            }
        }

        Ok(msgs)
    }
}
