// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thin `eventfd` wrapper shared by listeners, the waitset wake channel and
//! the signal layer.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

const EVENTFD_FLAGS: libc::c_int = libc::EFD_NONBLOCK | libc::EFD_CLOEXEC;

/// Non-blocking counting `eventfd`. Readable while its counter is non-zero.
#[derive(Debug)]
pub(crate) struct EventFd {
    fd: RawFd,
}

impl EventFd {
    pub(crate) fn new() -> io::Result<Self> {
        // SAFETY: eventfd is invoked with valid flags and no shared state.
        let fd = unsafe { libc::eventfd(0, EVENTFD_FLAGS) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Add one to the counter, waking every poller.
    pub(crate) fn signal(&self) {
        signal_raw(self.fd);
    }

    /// Reset the counter to zero.
    pub(crate) fn drain(&self) {
        let mut payload = [0u8; 8];
        loop {
            // SAFETY: payload is a stack buffer sized to the eventfd read requirements (8 bytes).
            let ret = unsafe { libc::read(self.fd, payload.as_mut_ptr().cast(), payload.len()) };
            if ret >= 0 {
                break;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => break,
                _ => {
                    log::warn!("[event] eventfd read failed: {}", err);
                    break;
                }
            }
        }
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        // SAFETY: fd was obtained via libc::eventfd and is closed once here.
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Write one to a raw eventfd. Only performs async-signal-safe calls so the
/// signal handler can use it.
pub(crate) fn signal_raw(fd: RawFd) {
    let payload = 1u64.to_ne_bytes();
    loop {
        // SAFETY: payload references a stack buffer with the 8-byte eventfd payload.
        let ret = unsafe { libc::write(fd, payload.as_ptr().cast(), payload.len()) };
        if ret >= 0 {
            return;
        }
        // EAGAIN means the counter is saturated, which still leaves it readable.
        if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waitset::reactor::{poll_readable, PollOutcome};
    use std::time::Duration;

    #[test]
    fn signal_makes_fd_readable_until_drained() {
        let fd = EventFd::new().expect("eventfd");
        assert_eq!(
            poll_readable(fd.as_raw_fd(), Some(Duration::ZERO)).expect("poll"),
            PollOutcome::Timeout
        );

        fd.signal();
        fd.signal();
        assert_eq!(
            poll_readable(fd.as_raw_fd(), Some(Duration::ZERO)).expect("poll"),
            PollOutcome::Ready
        );

        fd.drain();
        assert_eq!(
            poll_readable(fd.as_raw_fd(), Some(Duration::ZERO)).expect("poll"),
            PollOutcome::Timeout
        );
    }
}
