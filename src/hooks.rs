//! Process-wide instrumentation entry points
//!
//! Instrumented code reports to a single session. The session is created by
//! the first hook event (configured from the environment, with an `atexit`
//! finalizer) or up front by [`install`], which returns a guard that
//! finalizes when dropped. Either way [`finalize`] renders the report once;
//! events arriving after that are ignored until the next `install`. A guard
//! only finalizes the session it installed: once a later `install` has
//! replaced that session, dropping the old guard does nothing.
//!
//! With the `cyg-profile` feature the crate exports
//! `__cyg_profile_func_enter` / `__cyg_profile_func_exit`, the callbacks that
//! GCC and Clang emit for `-finstrument-functions`. They are plain C calls,
//! so no register or stack handling is involved. The entered function's
//! address (`this_fn`) is the node identity.
//!
//! Only one call stack can be profiled. Hook calls that cannot take the
//! session lock immediately (re-entrant or from a second thread) are dropped.

use crate::call_node::CallSiteId;
use crate::clock;
use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::lifecycle::ReportGuard;
use crate::symbols::ProcessResolver;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Once, TryLockError};
use tracing::{debug, error, warn};

type Session = ReportGuard<ProcessResolver>;

/// Generation of lazily created sessions, which no guard owns
const LAZY_GENERATION: u64 = 0;

/// The running session and the `install` call that created it
struct Slot {
    generation: u64,
    session: Session,
}

static SESSION: Mutex<Option<Slot>> = Mutex::new(None);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(LAZY_GENERATION + 1);
static FINALIZED: AtomicBool = AtomicBool::new(false);
static ATEXIT: Once = Once::new();

/// Finalizes the process-wide session when dropped
#[must_use = "dropping the guard immediately writes the (empty) report; bind it with `let _guard = ...`"]
#[derive(Debug)]
pub struct HookGuard {
    generation: u64,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Err(e) = finalize_generation(Some(self.generation)) {
            error!("Failed to write call tree report: {}", e);
        }
    }
}

/// Start a session with an explicit configuration
///
/// Replaces (and thereby finalizes) any session already running.
pub fn install(config: &ProfilerConfig) -> HookGuard {
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    let session = ReportGuard::from_config(ProcessResolver::new(), config);
    let previous = lock_session().replace(Slot {
        generation,
        session,
    });
    FINALIZED.store(false, Ordering::Release);
    debug!(generation, output = %config.output.display(), "call tree session installed");

    // Render the replaced session outside the lock
    drop(previous);
    HookGuard { generation }
}

/// Render and release the session
///
/// Returns `true` if a report was written. Safe to call repeatedly.
pub fn finalize() -> Result<bool> {
    finalize_generation(None)
}

/// Finalize the running session, or only the one `owner` installed
fn finalize_generation(owner: Option<u64>) -> Result<bool> {
    let slot = {
        let mut slot = lock_session();
        match (slot.as_ref(), owner) {
            (Some(running), Some(owner)) if running.generation != owner => return Ok(false),
            (None, Some(_)) => return Ok(false),
            _ => {}
        }
        FINALIZED.store(true, Ordering::Release);
        slot.take()
    };

    match slot {
        Some(slot) => slot.session.finish(),
        None => Ok(false),
    }
}

/// Whether a session currently exists
pub fn is_active() -> bool {
    lock_session().is_some()
}

/// Report a function entry, timestamped now
pub fn record_enter(site: CallSiteId) {
    record_enter_at(clock::read_cycles(), site);
}

/// Report a function exit, timestamped now
pub fn record_exit() {
    record_exit_at(clock::read_cycles());
}

/// Report a function entry with an explicit timestamp
pub fn record_enter_at(timestamp: u64, site: CallSiteId) {
    with_session(|session| session.enter(timestamp, site));
}

/// Report a function exit with an explicit timestamp
pub fn record_exit_at(timestamp: u64) {
    with_session(|session| session.leave(timestamp));
}

fn with_session<F: FnOnce(&mut Session)>(f: F) {
    if FINALIZED.load(Ordering::Acquire) {
        return;
    }

    let mut slot = match SESSION.try_lock() {
        Ok(slot) => slot,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return,
    };

    let slot = slot.get_or_insert_with(|| Slot {
        generation: LAZY_GENERATION,
        session: lazy_session(),
    });
    f(&mut slot.session);
}

fn lazy_session() -> Session {
    let config = ProfilerConfig::from_env().unwrap_or_else(|e| {
        warn!("Invalid call tree configuration, using defaults: {}", e);
        ProfilerConfig::default()
    });

    ATEXIT.call_once(|| {
        // SAFETY: finalize_at_exit is a plain extern "C" fn that never unwinds.
        if unsafe { libc::atexit(finalize_at_exit) } != 0 {
            warn!("Could not register exit handler; call finalize() explicitly");
        }
    });

    debug!(output = %config.output.display(), "call tree session started lazily");
    ReportGuard::from_config(ProcessResolver::new(), &config)
}

extern "C" fn finalize_at_exit() {
    if let Err(e) = finalize() {
        error!("Failed to write call tree report: {}", e);
    }
}

fn lock_session() -> MutexGuard<'static, Option<Slot>> {
    SESSION.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(feature = "cyg-profile")]
mod cyg {
    use super::{record_enter, record_exit};
    use crate::call_node::CallSiteId;
    use std::ffi::c_void;

    /// Called by `-finstrument-functions` code on function entry
    #[no_mangle]
    pub extern "C" fn __cyg_profile_func_enter(this_fn: *mut c_void, _call_site: *mut c_void) {
        record_enter(CallSiteId::from_ptr(this_fn));
    }

    /// Called by `-finstrument-functions` code on function exit
    #[no_mangle]
    pub extern "C" fn __cyg_profile_func_exit(_this_fn: *mut c_void, _call_site: *mut c_void) {
        record_exit();
    }
}
