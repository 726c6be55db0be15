// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide SIGINT/SIGTERM observation.
//!
//! The handler records the signal in an atomic and bumps an `eventfd` that
//! run loops include in their poll set, so a blocked wait returns as soon as
//! a signal arrives. Observed signals are sticky: once the process received
//! a termination request every run loop handling signals will stop.

use crate::event::fd::{signal_raw, EventFd};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;

/// Termination signals the run loop distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// `SIGINT` (Ctrl+C).
    Interrupt,
    /// `SIGTERM`.
    TerminationRequest,
}

impl TerminationSignal {
    fn from_raw(signum: libc::c_int) -> Option<Self> {
        match signum {
            libc::SIGINT => Some(Self::Interrupt),
            libc::SIGTERM => Some(Self::TerminationRequest),
            _ => None,
        }
    }
}

static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static INSTALLED: OnceLock<Result<EventFd, i32>> = OnceLock::new();

extern "C" fn on_termination_signal(signum: libc::c_int) {
    // SAFETY: __errno_location always returns a valid thread-local pointer.
    let saved_errno = unsafe { *libc::__errno_location() };

    LAST_SIGNAL.store(signum, Ordering::SeqCst);
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        signal_raw(fd);
    }

    // SAFETY: see above.
    unsafe { *libc::__errno_location() = saved_errno };
}

/// Entry point to the signal layer.
pub struct SignalHandler;

impl SignalHandler {
    /// Install the SIGINT and SIGTERM handlers. Idempotent; the first call
    /// decides the outcome for the whole process.
    pub fn install() -> io::Result<()> {
        match INSTALLED.get_or_init(install_handlers) {
            Ok(_) => Ok(()),
            Err(errno) => Err(io::Error::from_raw_os_error(*errno)),
        }
    }

    /// The most recent termination signal, if any arrived since installation.
    pub fn last_signal() -> Option<TerminationSignal> {
        TerminationSignal::from_raw(LAST_SIGNAL.load(Ordering::SeqCst))
    }

    /// `true` once SIGINT or SIGTERM was received.
    pub fn termination_requested() -> bool {
        Self::last_signal().is_some()
    }

    /// Descriptor that becomes readable when a signal arrives. `None` until
    /// [`SignalHandler::install`] succeeded.
    pub(crate) fn wake_fd() -> Option<RawFd> {
        match INSTALLED.get() {
            Some(Ok(fd)) => Some(fd.as_raw_fd()),
            _ => None,
        }
    }
}

fn install_handlers() -> Result<EventFd, i32> {
    let wake = EventFd::new().map_err(|e| e.raw_os_error().unwrap_or(libc::EIO))?;
    WAKE_FD.store(wake.as_raw_fd(), Ordering::SeqCst);

    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: sigaction is zero-initializable; every field we rely on is set below.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_termination_signal as extern "C" fn(libc::c_int) as usize;
        // No SA_RESTART: blocking syscalls must see EINTR.
        action.sa_flags = 0;

        // SAFETY: sa_mask is a valid sigset_t owned by `action`.
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        // SAFETY: action is fully initialized and the old action pointer may be null.
        let ret = unsafe { libc::sigaction(signum, &action, std::ptr::null_mut()) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            log::warn!("[signal] sigaction({}) failed: {}", signum, err);
            WAKE_FD.store(-1, Ordering::SeqCst);
            return Err(err.raw_os_error().unwrap_or(libc::EIO));
        }
    }

    log::debug!("[signal] SIGINT/SIGTERM handlers installed");
    Ok(wake)
}
