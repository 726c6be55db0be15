// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SIGTERM handling. Received signals are sticky for the whole process, so
//! this binary holds a single test.

use ipcwait::{RunError, RunResult, SignalHandler, TerminationSignal, WaitSetBuilder};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn sigterm_ends_blocked_run_with_termination_request() {
    let sut = WaitSetBuilder::new().create().expect("waitset");
    let _guard = sut
        .attach_interval(Duration::from_secs(3600))
        .expect("interval");
    assert!(!SignalHandler::termination_requested());

    let raiser = thread::spawn(|| {
        thread::sleep(Duration::from_millis(100));
        // SAFETY: kill targets only this process; the handler touches atomics and an eventfd.
        unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
    });

    let start = Instant::now();
    let mut dispatched = 0;
    let result = sut.wait_and_process(|_| dispatched += 1);
    raiser.join().expect("raiser thread");

    assert_eq!(result, Ok(RunResult::TerminationRequest));
    assert_eq!(dispatched, 0);
    assert!(start.elapsed() < Duration::from_secs(60));
    assert_eq!(
        SignalHandler::last_signal(),
        Some(TerminationSignal::TerminationRequest)
    );

    assert_eq!(
        sut.try_wait_and_process(|_| {}),
        Err(RunError::TerminationRequest)
    );
    assert_eq!(
        sut.wait_and_process(|_| {}),
        Ok(RunResult::TerminationRequest)
    );
}
