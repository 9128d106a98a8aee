//! # Navigation library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// CAN bus - adapter interface and simulated drive
pub mod bus;

/// Control cycle - one step of the main loop
pub mod cycle;

/// Global data store for the executable
pub mod data_store;

/// Feed client - recieves waypoints and range readings from the network
pub mod feed_client;

/// Feedback listener - folds drive feedback into the odometry in the background
pub mod feedback;

/// Odometry - dead reckoning from the drive feedback
pub mod odom;

/// Executable parameters
pub mod params;

/// Path intake - builds the path from incoming waypoints
pub mod path;

/// Segment control - open loop rotate-then-translate driving of each path segment
pub mod seg_ctrl;

/// Telemetry server - publishes the state of the vehicle
pub mod tm_server;

/// Transmit loop - schedules and sends drive frames
pub mod tx_loop;
