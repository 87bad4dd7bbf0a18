//! Synchronisation helpers

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use std::sync::{Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// The periodic activities must keep running even if one of them panics while holding a lock,
/// so the poisoned value is used as-is.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering a poisoned lock");
        poisoned.into_inner()
    })
}
