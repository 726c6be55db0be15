// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ipcwait-demo - WaitSet walkthrough
//!
//! Attaches heartbeat intervals, a listener fed by a notifier thread and a
//! deadline listener nobody notifies, then logs every dispatch until Ctrl+C,
//! SIGTERM or `--cycles` dispatches.

use clap::Parser;
use ipcwait::{EventServiceBuilder, Listener, RunResult, WaitSetBuilder, WaitSetGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// WaitSet demo
#[derive(Parser, Debug)]
#[command(name = "ipcwait-demo")]
#[command(version = "0.1.0")]
#[command(about = "Multiplex intervals, notifications and deadlines on one thread")]
struct Args {
    /// Interval periods in milliseconds (repeatable)
    #[arg(short, long, default_values_t = vec![500u64, 1500])]
    interval: Vec<u64>,

    /// Notifier thread period in milliseconds
    #[arg(short, long, default_value = "700")]
    notify_every: u64,

    /// Deadline of the silent listener in milliseconds
    #[arg(short, long, default_value = "2000")]
    deadline: u64,

    /// Stop after this many dispatched callbacks (0 = until signaled)
    #[arg(short, long, default_value = "0")]
    cycles: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(result) => println!("Finished: {}", result),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<RunResult, Box<dyn std::error::Error>> {
    let service = EventServiceBuilder::new().create();
    let fed = service.listener()?;
    let notifier = service.notifier()?;

    // Separate service without notifiers, so only its deadline can fire.
    let quiet_service = EventServiceBuilder::new().max_notifiers(0).create();
    let silent = quiet_service.listener()?;

    let waitset = WaitSetBuilder::new().create()?;

    let heartbeats = args
        .interval
        .iter()
        .map(|ms| waitset.attach_interval(Duration::from_millis(*ms)))
        .collect::<Result<Vec<WaitSetGuard<'_, '_>>, _>>()?;
    let fed_guard = waitset.attach_notification(&fed)?;
    let silent_guard = waitset.attach_deadline(&silent, Duration::from_millis(args.deadline))?;

    log::info!(
        "attached {} interval(s), 1 notification, 1 deadline",
        heartbeats.len()
    );

    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let running = Arc::clone(&running);
        let period = Duration::from_millis(args.notify_every);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                thread::sleep(period);
                match notifier.notify() {
                    Ok(reached) => log::debug!("notified {} listener(s)", reached),
                    Err(e) => log::warn!("notify failed: {}", e),
                }
            }
        })
    };

    let mut dispatched = 0u64;
    let result = waitset.wait_and_process(|id| {
        dispatched += 1;

        if let Some(idx) = heartbeats.iter().position(|g| id.has_event_from(g)) {
            println!("[{:>5}] heartbeat #{} ({} ms)", dispatched, idx, args.interval[idx]);
        } else if id.has_event_from(&fed_guard) {
            let events = drain(&fed);
            println!("[{:>5}] notification, {} event id(s)", dispatched, events);
        } else if id.has_event_from(&silent_guard) {
            drain(&silent);
            println!("[{:>5}] unexpected event on silent listener", dispatched);
        } else if id.has_missed_deadline(&silent_guard) {
            println!("[{:>5}] deadline missed ({} ms)", dispatched, args.deadline);
        }

        if args.cycles > 0 && dispatched >= args.cycles {
            waitset.stop();
        }
    });

    running.store(false, Ordering::Relaxed);
    if feeder.join().is_err() {
        log::warn!("notifier thread panicked");
    }

    Ok(result?)
}

/// Consume every pending event id; returns how many there were.
fn drain(listener: &Listener) -> usize {
    let mut events = 0;
    if let Err(e) = listener.try_wait_all(|_| events += 1) {
        log::warn!("draining listener failed: {}", e);
    }
    events
}
