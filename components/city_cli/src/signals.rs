//! Signal handling.
//!
//! Handlers only store the signal number in an atomic; all real work
//! happens on the run-loop thread between step slices. TERM and INT mean
//! checkpoint-then-exit, HUP means checkpoint-and-continue; after a final
//! snapshot the supervisor restores the default disposition and re-raises
//! the original signal.

use nix::libc::c_int;
use nix::sys::signal::{self, SigHandler, Signal};
use std::sync::atomic::{AtomicI32, Ordering};

static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn note_signal(sig: c_int) {
    PENDING_SIGNAL.store(sig, Ordering::SeqCst);
}

/// Installs handlers for TERM, INT and HUP.
#[allow(unsafe_code)]
pub fn install_handlers() -> nix::Result<()> {
    for sig in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP] {
        unsafe {
            signal::signal(sig, SigHandler::Handler(note_signal))?;
        }
    }
    Ok(())
}

/// Takes the most recent pending signal, if any.
pub fn take_pending() -> Option<Signal> {
    let raw = PENDING_SIGNAL.swap(0, Ordering::SeqCst);
    if raw == 0 {
        None
    } else {
        Signal::try_from(raw).ok()
    }
}

/// Restores the default disposition and re-raises `sig`; does not return
/// for fatal signals.
#[allow(unsafe_code)]
pub fn reraise(sig: Signal) -> nix::Result<()> {
    unsafe {
        signal::signal(sig, SigHandler::SigDfl)?;
    }
    signal::raise(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_pending_is_one_shot() {
        PENDING_SIGNAL.store(Signal::SIGHUP as i32, Ordering::SeqCst);
        assert_eq!(take_pending(), Some(Signal::SIGHUP));
        assert_eq!(take_pending(), None);
    }
}
