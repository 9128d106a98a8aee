//! Main navigation executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the bus, bringing up every channel
//!     - Start the feedback listener
//!     - Main loop:
//!         - Feed input acquisition (waypoints and range readings)
//!         - Segment control processing
//!         - Frame transmission
//!         - Position integration
//!         - Archiving and telemetry
//!     - Shutdown: stop the listener, reset the channels and close the bus
//!
//! # Modules
//!
//! Cyclic modules (e.g. `seg_ctrl`) shall provide a public struct implementing the
//! `util::module::State` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, error, info, warn};
use std::{path::PathBuf, sync::Arc, thread, time::{Duration, Instant}};
use structopt::StructOpt;

// Internal
use comms_if::net::{NetParams, zmq};
use nav_lib::{
    bus::{self, BusDriver, BusTransport, SimBus},
    cycle,
    data_store::DataStore,
    feed_client::FeedClient,
    feedback::FeedbackListener,
    odom::OdomState,
    params::NavExecParams,
    tm_server::{NavTm, TmArchive, TmServer},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
    script_interpreter::{ScriptInterpreter, PendingMsgs},
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Drive a vehicle through a series of waypoints over the CAN bus.
#[derive(Debug, StructOpt)]
#[structopt(name = "nav_exec")]
struct Opt {
    /// Feed script to replay instead of subscribing to the network feed
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,

    /// Minimum log level, one of `info`, `debug` or `trace`
    #[structopt(short, long, default_value = "info")]
    log_level: LevelFilter,

    /// Don't publish telemetry on the network
    #[structopt(long)]
    no_net: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Sources for the waypoint and range messages.
enum FeedSource {
    Remote(FeedClient),
    Script(ScriptInterpreter)
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new(
        "nav_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    logger_init(opt.log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let params: NavExecParams = util::params::load("nav_exec.toml")
        .wrap_err("Could not load exec params")?;

    // The network is needed for the feed unless a script is given
    let net_params: Option<NetParams> = match opt.no_net && opt.script.is_some() {
        true => None,
        false => Some(
            util::params::load("net.toml").wrap_err("Could not load net params")?
        )
    };

    info!("Exec parameters loaded");

    // ---- INITIALISE FEED SOURCE ----

    let zmq_ctx = zmq::Context::new();

    let mut feed_source = match (&opt.script, &net_params) {
        (Some(path), _) => {
            info!("Loading feed script from {:?}", path);

            let si = ScriptInterpreter::new(path)
                .wrap_err("Failed to load feed script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} messages\n",
                si.get_duration(),
                si.get_num_msgs()
            );

            FeedSource::Script(si)
        },
        (None, Some(np)) => {
            info!("No script provided, the feed will be received from {}\n", np.feed_endpoint);

            FeedSource::Remote(
                FeedClient::new(&zmq_ctx, np)
                    .wrap_err("Failed to initialise the FeedClient")?
            )
        },
        (None, None) => return Err(eyre!("No feed source available"))
    };

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::new(&params);

    // ---- INITIALISE MODULES ----

    ds.seg_ctrl.init("seg_ctrl.toml", &session)
        .wrap_err("Failed to initialise SegCtrl")?;
    info!("SegCtrl init complete");

    params.check(ds.seg_ctrl.params())
        .wrap_err("Inconsistent exec and SegCtrl params")?;

    let mut tm_archive = TmArchive::new(&session)
        .wrap_err("Failed to initialise the telemetry archive")?;

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    let mut tm_server = match (opt.no_net, &net_params) {
        (false, Some(np)) => {
            let s = TmServer::new(&zmq_ctx, np)
                .wrap_err("Failed to initialise TmServer")?;
            info!("TmServer initialised");
            Some(s)
        },
        _ => {
            info!("Telemetry will not be published");
            None
        }
    };

    // ---- INITIALISE BUS ----

    info!("Initialising CAN bus");

    let bus: Arc<dyn BusTransport> = match params.bus.driver {
        BusDriver::Sim => Arc::new(SimBus::new())
    };

    bus::open_bus(bus.as_ref(), &params.bus)
        .wrap_err("Failed to open the CAN bus")?;

    let odom = OdomState::new_shared();

    let listener = FeedbackListener::start(
        bus.clone(),
        params.bus.rx_channel,
        odom.clone(),
        &params.feedback
    ).wrap_err("Failed to start the feedback listener")?;

    info!("CAN bus initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let run_start = Instant::now();
    let mut script_ended = false;
    let mut feed_connected = false;

    loop {

        let cycle_start_instant = Instant::now();

        ds.cycle_start();

        // ---- FEED INPUT ----

        match feed_source {
            FeedSource::Remote(ref client) => {
                if client.is_connected() != feed_connected {
                    feed_connected = !feed_connected;
                    match feed_connected {
                        true => info!("Feed publisher connected"),
                        false => warn!("Feed publisher disconnected")
                    }
                }

                match client.receive_all() {
                    Ok(msgs) => msgs.into_iter().for_each(|m| ds.apply_feed(m)),
                    Err(e) => warn!("FeedClient error: {}", e)
                }
            },
            FeedSource::Script(ref mut si) => match si.get_pending(ds.session_time_s) {
                PendingMsgs::None => (),
                PendingMsgs::Some(msgs) => msgs.into_iter().for_each(|m| ds.apply_feed(m)),
                // The vehicle keeps driving after the last message
                PendingMsgs::EndOfScript => if !script_ended {
                    info!("End of feed script reached");
                    script_ended = true;
                }
            }
        }

        // ---- CONTROL AND TRANSMISSION ----

        if let Err(e) = cycle::step(&mut ds, bus.as_ref(), &odom, params.cycle_period_s) {
            error!("Transmission failed, ending run: {}", e);
            break;
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = ds.seg_ctrl.write() {
            warn!("Could not write SegCtrl archive: {}", e);
        }

        let tm = NavTm::from_datastore(&ds);

        tm_archive.set(tm);
        if let Err(e) = tm_archive.write() {
            warn!("Could not write telemetry archive: {}", e);
        }

        // ---- TELEMETRY ----

        if let Some(ref mut s) = tm_server {
            if let Err(e) = s.send(&tm) {
                warn!("TmServer error: {}", e);
            }
        }

        // ---- CYCLE MANAGEMENT ----

        ds.cycle_end();

        if params.run_elapsed(run_start) {
            info!("Run duration of {:.02} s elapsed", params.run_duration_s);
            break;
        }

        let cycle_dur = Instant::now() - cycle_start_instant;

        match params.cycle_period().checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    (cycle_dur - params.cycle_period()).as_secs_f64()
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Main loop ended, waiting {:?} before shutdown", params.shutdown_linger());
    thread::sleep(params.shutdown_linger());

    match listener.stop(params.listener_join_timeout()) {
        Ok(stats) => info!(
            "Feedback listener stopped: {} linear, {} angular, {} discarded, {} receive errors",
            stats.num_linear, stats.num_angular, stats.num_discarded, stats.num_recv_errors
        ),
        Err(e) => warn!("Feedback listener did not stop cleanly: {}", e)
    }

    ds.odom = *odom.lock().expect("Odometry mutex poisoned");

    if let Err(e) = bus::close_bus(bus.as_ref(), &params.bus, params.channel_reset_delay()) {
        warn!("Error while closing the CAN bus: {}", e);
    }

    ds.log_summary();

    // Give the telemetry subscribers a chance to receive the last packet
    drop(tm_server);
    thread::sleep(Duration::from_millis(10));

    info!("End of execution");

    Ok(())
}
