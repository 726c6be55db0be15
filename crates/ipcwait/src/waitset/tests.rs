// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::event::EventServiceBuilder;
use std::cell::RefCell;
use std::thread;

fn create_sut() -> WaitSet {
    WaitSetBuilder::new()
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .expect("waitset")
}

#[test]
fn builder_applies_capacity_and_mode() {
    let sut = WaitSetBuilder::new()
        .capacity(3)
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .expect("waitset");

    assert_eq!(sut.capacity(), 3);
    assert_eq!(sut.signal_handling_mode(), SignalHandlingMode::Disabled);
    assert_eq!(
        WaitSetBuilder::new().create().expect("default").capacity(),
        DEFAULT_WAITSET_CAPACITY
    );
}

#[test]
fn exceeding_capacity_fails_with_insufficient_capacity() {
    let sut = WaitSetBuilder::new()
        .capacity(2)
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .expect("waitset");

    let _a = sut.attach_interval(Duration::from_secs(1)).expect("a");
    let b = sut.attach_interval(Duration::from_secs(1)).expect("b");
    assert_eq!(
        sut.attach_interval(Duration::from_secs(1)).err(),
        Some(AttachmentError::InsufficientCapacity)
    );

    drop(b);
    assert!(sut.attach_interval(Duration::from_secs(1)).is_ok());
}

#[test]
fn stop_before_run_ends_first_cycle() {
    let sut = create_sut();
    let _guard = sut.attach_interval(Duration::from_secs(3600)).expect("guard");

    sut.stop();
    let start = Instant::now();
    let result = sut.wait_and_process(|_| {}).expect("run");

    assert_eq!(result, RunResult::StopRequest);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn stop_is_idempotent_and_consumed_by_one_run() {
    let sut = create_sut();
    let _guard = sut.attach_interval(Duration::from_secs(3600)).expect("guard");

    sut.stop();
    sut.stop();
    assert_eq!(
        sut.try_wait_and_process(|_| {}).expect("first pass"),
        RunResult::StopRequest
    );
    assert_eq!(
        sut.try_wait_and_process(|_| {}).expect("second pass"),
        RunResult::AllEventsHandled
    );
}

#[test]
fn guard_dropped_by_earlier_callback_is_not_dispatched() {
    let sut = create_sut();
    let first = sut.attach_interval(Duration::ZERO).expect("first");
    let second = RefCell::new(Some(sut.attach_interval(Duration::ZERO).expect("second")));

    let mut dispatched = 0;
    sut.try_wait_and_process(|id| {
        dispatched += 1;
        if id.has_event_from(&first) {
            second.borrow_mut().take();
        }
    })
    .expect("pass");

    assert_eq!(dispatched, 1);
    assert_eq!(sut.len(), 1);
}

#[test]
fn all_fired_attachments_are_dispatched_before_stop_takes_effect() {
    let sut = create_sut();
    let guards: Vec<_> = (0..4)
        .map(|_| sut.attach_interval(Duration::ZERO).expect("interval"))
        .collect();

    let mut dispatched = 0;
    let result = sut
        .wait_and_process(|_| {
            dispatched += 1;
            sut.stop();
        })
        .expect("run");

    assert_eq!(result, RunResult::StopRequest);
    assert_eq!(dispatched, guards.len());
}

#[test]
fn dispatch_order_follows_attachment_order() {
    let sut = create_sut();
    let guards: Vec<_> = (0..5)
        .map(|_| sut.attach_interval(Duration::ZERO).expect("interval"))
        .collect();

    let mut order = Vec::new();
    sut.try_wait_and_process(|id| {
        if let Some(pos) = guards.iter().position(|g| id.has_event_from(g)) {
            order.push(pos);
        }
    })
    .expect("pass");

    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[test]
fn attach_from_other_thread_wakes_blocked_run() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let _idle = sut.attach_notification(&listener).expect("notification");

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            let _tick = sut.attach_interval(Duration::from_millis(10)).expect("tick");
            thread::sleep(Duration::from_millis(500));
        });

        let start = Instant::now();
        let result = sut
            .wait_and_process(|_| sut.stop())
            .expect("run");

        assert_eq!(result, RunResult::StopRequest);
        assert!(start.elapsed() < Duration::from_millis(500));
    });
}

#[test]
fn stop_from_other_thread_wakes_blocked_run() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let _idle = sut.attach_notification(&listener).expect("notification");

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            sut.stop();
        });

        let mut dispatched = 0;
        let result = sut.wait_and_process(|_| dispatched += 1).expect("run");
        assert_eq!(result, RunResult::StopRequest);
        assert_eq!(dispatched, 0);
    });
}

#[test]
fn once_with_timeout_returns_after_timeout_without_dispatch() {
    let sut = create_sut();
    let _guard = sut.attach_interval(Duration::from_secs(3600)).expect("guard");

    let start = Instant::now();
    let mut dispatched = 0;
    let result = sut
        .wait_and_process_once_with_timeout(|_| dispatched += 1, Duration::from_millis(30))
        .expect("pass");

    assert_eq!(result, RunResult::AllEventsHandled);
    assert_eq!(dispatched, 0);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn blocking_once_waits_for_the_next_timer() {
    let sut = create_sut();
    let guard = sut.attach_interval(Duration::from_millis(40)).expect("guard");

    let start = Instant::now();
    let mut fired = false;
    let result = sut
        .wait_and_process_once(|id| fired |= id.has_event_from(&guard))
        .expect("pass");

    assert_eq!(result, RunResult::AllEventsHandled);
    assert!(fired);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn notification_keeps_firing_until_listener_is_drained() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let notifier = service.notifier().expect("notifier");
    let guard = sut.attach_notification(&listener).expect("guard");

    notifier.notify().expect("notify");

    for _ in 0..2 {
        let mut fired = false;
        sut.try_wait_and_process(|id| fired |= id.has_event_from(&guard))
            .expect("pass");
        assert!(fired);
    }

    listener.try_wait_all(|_| {}).expect("drain");
    let mut fired = false;
    sut.try_wait_and_process(|id| fired |= id.has_event_from(&guard))
        .expect("pass");
    assert!(!fired);
}

#[test]
fn detached_listener_slot_cannot_be_matched_by_new_guard() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let notifier = service.notifier().expect("notifier");

    let old = sut.attach_notification(&listener).expect("old");
    let old_key = old.key;
    drop(old);
    let new = sut.attach_notification(&listener).expect("reattach");
    assert_ne!(old_key, new.key);

    notifier.notify().expect("notify");
    let mut fired = false;
    sut.try_wait_and_process(|id| {
        assert_ne!(id.key, old_key);
        fired |= id.has_event_from(&new);
    })
    .expect("pass");
    assert!(fired);
}

#[test]
fn error_values_render_messages() {
    assert_eq!(
        AttachmentError::AlreadyAttached.to_string(),
        "Source is already attached"
    );
    assert_eq!(RunError::NoAttachments.to_string(), "WaitSet has no attachments");
    assert_eq!(RunResult::StopRequest.to_string(), "Stop requested");
    assert_eq!(
        map_poll_error(&io::Error::from_raw_os_error(libc::EPERM)),
        RunError::InsufficientPermissions
    );
    assert_eq!(
        map_poll_error(&io::Error::from_raw_os_error(libc::EBADF)),
        RunError::InternalError
    );
}

#[test]
fn unbounded_durations_attach_without_firing_by_time() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let notifier = service.notifier().expect("notifier");

    let never = sut.attach_interval(Duration::MAX).expect("interval");
    let deadline = sut
        .attach_deadline(&listener, Duration::MAX)
        .expect("deadline");

    let mut dispatched = 0;
    let result = sut
        .wait_and_process_once_with_timeout(|_| dispatched += 1, Duration::from_millis(20))
        .expect("idle pass");
    assert_eq!(result, RunResult::AllEventsHandled);
    assert_eq!(dispatched, 0);

    notifier.notify().expect("notify");
    let mut notified = false;
    sut.try_wait_and_process(|id| {
        assert!(!id.has_event_from(&never));
        assert!(!id.has_missed_deadline(&deadline));
        notified |= id.has_event_from(&deadline);
    })
    .expect("notified pass");
    assert!(notified);
}

#[test]
fn attach_wakes_blocked_run_after_concurrent_run_returned() {
    let sut = create_sut();
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let _idle = sut.attach_notification(&listener).expect("notification");

    thread::scope(|s| {
        let blocked = s.spawn(|| {
            let start = Instant::now();
            sut.wait_and_process_once_with_timeout(|_| {}, Duration::from_secs(5))
                .expect("blocked pass");
            start.elapsed()
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(
            sut.wait_and_process_once_with_timeout(|_| {}, Duration::from_millis(20))
                .expect("short pass"),
            RunResult::AllEventsHandled
        );

        thread::sleep(Duration::from_millis(50));
        let _tick = sut.attach_interval(Duration::from_millis(10)).expect("tick");

        // The attach wakes the remaining loop; its pass ends long before 5s.
        let elapsed = blocked.join().expect("blocked thread");
        assert!(elapsed < Duration::from_secs(2));
    });
}
