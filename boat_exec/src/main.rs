//! Main boat executable entry point.
//!
//! # Architecture
//!
//! The executable:
//!
//!     - Loads the parameters, from `$BOAT_SW_ROOT/params/boat_exec.toml` or from the path given
//!       as the only argument
//!     - Opens the micro-controller's serial device as a newline-delimited JSON link
//!     - Starts the vehicle server, which runs every activity on its own thread
//!     - Waits for the link to close, then shuts the server down

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info};
use std::{
    env,
    fs::OpenOptions,
    io::BufReader,
    sync::Arc,
    thread,
    time::Duration,
};

// Internal
use boat_lib::{events::LogEventSink, params::BoatExecParams, server::VehicleServer};
use comms_if::net::JsonLinesTransport;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default parameter file, relative to the params directory.
const PARAMS_FILE: &str = "boat_exec.toml";

/// Period at which the main thread checks the link.
const LINK_CHECK_PERIOD: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("boat_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Boat Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let params: BoatExecParams = match args.len() {
        1 => util::params::load(PARAMS_FILE).wrap_err("Could not load exec params")?,
        2 => util::params::load_from_path(&args[1])
            .wrap_err_with(|| format!("Could not load exec params from {}", args[1]))?,
        _ => {
            return Err(eyre!(
                "Expected at most one argument (the parameter file), found {}",
                args.len() - 1
            ))
        }
    };

    info!("Exec parameters loaded");

    // ---- OPEN THE MICRO-CONTROLLER LINK ----

    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&params.mcu_link.device)
        .wrap_err_with(|| format!("Could not open {}", params.mcu_link.device))?;
    let writer = device
        .try_clone()
        .wrap_err("Could not clone the device handle")?;

    let transport = JsonLinesTransport::new(BufReader::new(device), writer);

    info!("Micro-controller link open on {}", params.mcu_link.device);

    // ---- START THE SERVER ----

    let server = VehicleServer::new(params, Arc::new(transport), Arc::new(LogEventSink))
        .wrap_err("Failed to start the vehicle server")?;

    info!("Vehicle server running\n");

    while !server.is_link_closed() {
        thread::sleep(LINK_CHECK_PERIOD);
    }

    info!("Micro-controller link closed, exiting");

    server.shutdown();

    Ok(())
}
