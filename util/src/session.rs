//! Session management
//!
//! A session is one run of an executable. It owns a timestamped directory holding the run's log
//! and events files, and fixes the epoch that logged times are measured from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of the events file inside the session directory.
const EVENTS_FILE_NAME: &str = "events.jsonl";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// Diagnostic log
    pub log_file_path: PathBuf,

    /// Structured event records, one JSON object per line
    pub events_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (BOAT_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("A session has already been started in this process ({0})")]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the session epoch")]
    CannotGetEpoch,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start the process's session.
    ///
    /// Creates `$BOAT_SW_ROOT/{sessions_dir}/{exec_name}_{timestamp}`. Only one session may be
    /// started per process.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = get_epoch()
            .ok_or(SessionError::CannotGetEpoch)?
            .format(TIMESTAMP_FORMAT);

        let mut session_root = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;
        session_root.push(sessions_dir);
        session_root.push(format!("{}_{}", exec_name, timestamp));

        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            events_file_path: session_root.join(EVENTS_FILE_NAME),
            session_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the start of the session, or `NAN` if no session was started (as in
/// tests).
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(std::f64::NAN),
        None => std::f64::NAN,
    }
}

/// The session's epoch, if a session has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}
