// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ipcwait - event multiplexing for inter-process messaging
//!
//! Lets one thread block on many heterogeneous event sources at once and
//! dispatch whatever fired to user code.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ipcwait::{EventServiceBuilder, WaitSetBuilder};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = EventServiceBuilder::new().create();
//!     let listener = service.listener()?;
//!
//!     let waitset = WaitSetBuilder::new().create()?;
//!     let heartbeat = waitset.attach_interval(Duration::from_secs(1))?;
//!     let data = waitset.attach_deadline(&listener, Duration::from_secs(5))?;
//!
//!     let result = waitset.wait_and_process(|id| {
//!         if id.has_event_from(&heartbeat) {
//!             println!("tick");
//!         } else if id.has_event_from(&data) {
//!             let _ = listener.try_wait_all(|event| println!("event {:?}", event));
//!         } else if id.has_missed_deadline(&data) {
//!             println!("no data for 5s");
//!         }
//!     })?;
//!
//!     println!("run loop ended: {}", result);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------------+
//! |                         WaitSet                           |
//! |  attach_interval / attach_notification / attach_deadline  |
//! |        |                                                  |
//! |        v                                                  |
//! |  AttachmentRegistry --> earliest timer + poll set         |
//! |        |                                                  |
//! |        v                                                  |
//! |  poll(listeners, wake eventfd, signal eventfd, timeout)   |
//! |        |                                                  |
//! |        v                                                  |
//! |  classify -> AttachmentId per fired guard -> callback     |
//! +-----------------------------------------------------------+
//!          ^                                 ^
//!   Listener (eventfd)                SignalHandler (SIGINT/SIGTERM)
//! ```
//!
//! ## Modules Overview
//!
//! - [`waitset`] - the multiplexer (start here)
//! - [`event`] - listeners and notifiers
//! - [`signal`] - termination signal observation
//! - [`config`] - default limits

/// Default limits and the signal handling mode.
pub mod config;
/// Event service: listeners, notifiers and the `NotificationSource` trait.
pub mod event;
/// Process-wide SIGINT/SIGTERM observation.
pub mod signal;
/// The WaitSet event multiplexer.
pub mod waitset;

pub use config::SignalHandlingMode;
pub use event::{
    EventId, EventService, EventServiceBuilder, Listener, ListenerCreateError, ListenerWaitError,
    NotificationSource, Notifier, NotifierCreateError, NotifierNotifyError,
};
pub use signal::{SignalHandler, TerminationSignal};
pub use waitset::{
    AttachmentError, AttachmentId, RunError, RunResult, WaitSet, WaitSetBuilder,
    WaitSetCreateError, WaitSetGuard,
};

/// ipcwait version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
