// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WaitSet dispatch cost: one non-blocking pass over ready attachments, and
//! notify-to-dispatch latency through a listener.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ipcwait::{EventServiceBuilder, Listener, SignalHandlingMode, WaitSet, WaitSetBuilder};
use std::time::Duration;

fn create_waitset(capacity: usize) -> WaitSet {
    WaitSetBuilder::new()
        .capacity(capacity)
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .expect("waitset")
}

/// Benchmark: try_wait_and_process with N always-ready intervals
fn bench_try_pass_intervals(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_pass_intervals");
    for count in [1usize, 16, 128] {
        let waitset = create_waitset(count);
        let _guards: Vec<_> = (0..count)
            .map(|_| waitset.attach_interval(Duration::ZERO).expect("interval"))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut fired = 0usize;
                waitset
                    .try_wait_and_process(|id| {
                        black_box(id);
                        fired += 1;
                    })
                    .expect("pass");
                black_box(fired)
            })
        });
    }
    group.finish();
}

/// Benchmark: notify -> readable listener -> callback -> drain
fn bench_notify_dispatch(c: &mut Criterion) {
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let notifier = service.notifier().expect("notifier");
    let waitset = create_waitset(4);
    let guard = waitset.attach_notification(&listener).expect("notification");

    c.bench_function("notify_dispatch", |b| {
        b.iter(|| {
            notifier.notify().expect("notify");
            waitset
                .try_wait_and_process(|id| {
                    if id.has_event_from(&guard) {
                        drain(&listener);
                    }
                })
                .expect("pass");
        })
    });
}

fn drain(listener: &Listener) {
    listener
        .try_wait_all(|event| {
            black_box(event);
        })
        .expect("drain");
}

/// Benchmark: attach + detach of a deadline attachment
fn bench_attach_detach(c: &mut Criterion) {
    let service = EventServiceBuilder::new().create();
    let listener = service.listener().expect("listener");
    let waitset = create_waitset(4);

    c.bench_function("attach_detach_deadline", |b| {
        b.iter(|| {
            let guard = waitset
                .attach_deadline(&listener, Duration::from_secs(1))
                .expect("deadline");
            drop(black_box(guard));
        })
    });
}

criterion_group!(
    waitset_benches,
    bench_try_pass_intervals,
    bench_notify_dispatch,
    bench_attach_detach
);
criterion_main!(waitset_benches);
