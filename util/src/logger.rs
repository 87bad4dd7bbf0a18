//! Logger initialisation
//!
//! Two streams leave the logger:
//!
//! - Diagnostic records go to stdout and to the session's log file, prefixed with the session
//!   elapsed time and a coloured level tag.
//! - Event records (target `event`) are the vehicle's data log. They are already serialised by
//!   the caller, so they are written bare, one per line, to the session's events file.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use colored::{ColoredString, Colorize};
use log::{self, info};
use thiserror::Error;

use crate::session::{self, Session};

pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Log target used for structured event records.
pub const EVENT_TARGET: &str = "event";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error opening a log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` applies to diagnostic records and must allow `INFO`. Event records are always
/// kept.
///
/// Only the first call in a process can succeed.
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;
    let events_file = fern::log_file(&session.events_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let diagnostics = fern::Dispatch::new()
        .filter(|meta| meta.target() != EVENT_TARGET)
        .format(|out, message, record| {
            // Debug and trace records carry their target
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stdout())
        .chain(log_file);

    let events = fern::Dispatch::new()
        .filter(|meta| meta.target() == EVENT_TARGET)
        .level(LevelFilter::Info)
        .chain(events_file);

    fern::Dispatch::new()
        .chain(diagnostics)
        .chain(events)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);
    info!("    Events file path: {:?}", session.events_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}
