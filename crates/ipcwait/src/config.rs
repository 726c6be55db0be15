// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ipcwait global configuration - single source of truth for default sizes.
//!
//! Builders start from these values; override them per instance through
//! [`WaitSetBuilder`](crate::WaitSetBuilder) and
//! [`EventServiceBuilder`](crate::EventServiceBuilder).
//! **NEVER hardcode these limits elsewhere!**

/// Default maximum number of attachments per [`WaitSet`](crate::WaitSet).
pub const DEFAULT_WAITSET_CAPACITY: usize = 128;

/// Default maximum number of listeners an event service accepts.
pub const DEFAULT_MAX_LISTENERS: usize = 16;

/// Default maximum number of notifiers an event service accepts.
pub const DEFAULT_MAX_NOTIFIERS: usize = 16;

/// Default largest event id a notifier may emit.
pub const DEFAULT_EVENT_ID_MAX_VALUE: u64 = 4095;

/// Defines how a [`WaitSet`](crate::WaitSet) reacts to SIGINT and SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignalHandlingMode {
    /// Install the process-wide handlers and leave the run loop with
    /// `TerminationRequest` or `Interrupt` once a signal arrives.
    #[default]
    HandleTerminationRequests,
    /// Never consult the signal layer. Signals keep their previous
    /// disposition.
    Disabled,
}
