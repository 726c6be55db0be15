// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking primitive behind the run loop: wait until a timeout elapses, any
//! registered descriptor becomes readable, or a signal interrupts the call.
//!
//! Signals are covered twice: the handler writes the signal layer's eventfd
//! (which is part of every poll set when signal handling is enabled) and the
//! handler is installed without `SA_RESTART`, so `poll` also returns `EINTR`.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Three-way classification of a finished wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// At least one descriptor is readable.
    Ready,
    /// The timeout elapsed without activity.
    Timeout,
    /// A signal interrupted the wait.
    Interrupted,
}

/// Descriptor set for one `libc::poll` call.
#[derive(Default)]
pub(crate) struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    /// Watch `fd` for readability; returns its index in the set.
    pub(crate) fn push(&mut self, fd: RawFd) -> usize {
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.fds.len() - 1
    }

    pub(crate) fn is_ready(&self, index: usize) -> bool {
        self.fds.get(index).is_some_and(|pollfd| {
            // POLLNVAL means the fd was closed under us (detached mid-wait).
            pollfd.revents & libc::POLLNVAL == 0
                && pollfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0
        })
    }

    /// Block for at most `timeout` (`None` = indefinitely).
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<PollOutcome> {
        for pollfd in &mut self.fds {
            pollfd.revents = 0;
        }

        let nfds = libc::nfds_t::try_from(self.fds.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many descriptors"))?;

        // SAFETY: fds points to `nfds` initialized pollfd structures owned by self.
        let res = unsafe { libc::poll(self.fds.as_mut_ptr(), nfds, timeout_ms(timeout)) };
        if res == 0 {
            return Ok(PollOutcome::Timeout);
        }
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(PollOutcome::Interrupted);
            }
            return Err(err);
        }
        Ok(PollOutcome::Ready)
    }
}

/// Wait for a single descriptor.
pub(crate) fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> io::Result<PollOutcome> {
    let mut set = PollSet::default();
    set.push(fd);
    set.wait(timeout)
}

/// Milliseconds for `poll`, rounded up so a wait never ends before `timeout`.
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
        }
    }
}
