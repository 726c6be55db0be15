// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WaitSet - block on intervals, deadlines and listeners at once
//!
//! A [`WaitSet`] aggregates three kinds of wait conditions:
//!
//! | Attach call | Fires when | Missed deadline |
//! |-------------|------------|-----------------|
//! | [`WaitSet::attach_interval`] | the period elapsed | never |
//! | [`WaitSet::attach_notification`] | the listener is readable | never |
//! | [`WaitSet::attach_deadline`] | the listener is readable, or the timeout expired | on expiry |
//!
//! Every attach call returns a [`WaitSetGuard`]; dropping it detaches the
//! condition. The run loop computes the earliest timer, polls every attached
//! listener plus an internal wake descriptor (and the signal layer's, when
//! enabled), classifies the wakeup and hands one [`AttachmentId`] per fired
//! attachment to the user callback.
//!
//! ```text
//!        +--> Waiting --wakeup--> Dispatching --+--> Waiting
//! run ---+      |                               |
//!               +--signal--> Terminated <--stop-+
//! ```
//!
//! # Example
//!
//! ```rust
//! use ipcwait::{RunResult, WaitSetBuilder};
//! use std::time::Duration;
//!
//! let waitset = WaitSetBuilder::new().create()?;
//! let tick = waitset.attach_interval(Duration::from_millis(10))?;
//!
//! let mut ticks = 0;
//! let result = waitset.wait_and_process(|id| {
//!     if id.has_event_from(&tick) {
//!         ticks += 1;
//!         if ticks == 3 {
//!             waitset.stop();
//!         }
//!     }
//! })?;
//! assert_eq!(result, RunResult::StopRequest);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod attachment;
pub(crate) mod reactor;
mod registry;

use crate::config::{SignalHandlingMode, DEFAULT_WAITSET_CAPACITY};
use crate::event::fd::EventFd;
use crate::event::NotificationSource;
use crate::signal::{SignalHandler, TerminationSignal};
use attachment::{earliest_deadline, Attachment, FireKind, SourceRef};
use parking_lot::Mutex;
use reactor::{PollOutcome, PollSet};
use registry::{AttachmentRegistry, GuardKey, InsertError};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// Results and errors
// ============================================================================

/// Why a run call returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunResult {
    /// A termination signal `SIGTERM` was received.
    TerminationRequest,
    /// An interrupt signal `SIGINT` was received.
    Interrupt,
    /// [`WaitSet::stop`] was called.
    StopRequest,
    /// A single-pass call finished its pass.
    AllEventsHandled,
}

impl From<TerminationSignal> for RunResult {
    fn from(signal: TerminationSignal) -> Self {
        match signal {
            TerminationSignal::Interrupt => Self::Interrupt,
            TerminationSignal::TerminationRequest => Self::TerminationRequest,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminationRequest => write!(f, "Termination request received"),
            Self::Interrupt => write!(f, "Interrupt received"),
            Self::StopRequest => write!(f, "Stop requested"),
            Self::AllEventsHandled => write!(f, "All events handled"),
        }
    }
}

/// Failures of [`WaitSetBuilder::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSetCreateError {
    /// The wake descriptor or the signal handlers could not be set up.
    InternalError,
}

impl fmt::Display for WaitSetCreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalError => write!(f, "Internal error while creating the waitset"),
        }
    }
}

impl std::error::Error for WaitSetCreateError {}

/// Failures of the attach calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentError {
    /// The WaitSet's capacity is exceeded.
    InsufficientCapacity,
    /// The listener is already attached to this WaitSet.
    AlreadyAttached,
    /// An internal error has occurred.
    InternalError,
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientCapacity => write!(f, "WaitSet capacity exceeded"),
            Self::AlreadyAttached => write!(f, "Source is already attached"),
            Self::InternalError => write!(f, "Internal error while attaching"),
        }
    }
}

impl std::error::Error for AttachmentError {}

impl From<InsertError> for AttachmentError {
    fn from(err: InsertError) -> Self {
        match err {
            InsertError::Full => Self::InsufficientCapacity,
            InsertError::DuplicateSource => Self::AlreadyAttached,
        }
    }
}

/// Failures of the run calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// The process may not wait on one of the attachments.
    InsufficientPermissions,
    /// An internal error has occurred.
    InternalError,
    /// Waiting on an empty WaitSet would deadlock.
    NoAttachments,
    /// `SIGTERM` was pending before a single pass could dispatch.
    TerminationRequest,
    /// `SIGINT` was pending before a single pass could dispatch.
    Interrupt,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientPermissions => write!(f, "Insufficient permissions to wait"),
            Self::InternalError => write!(f, "Internal error while waiting"),
            Self::NoAttachments => write!(f, "WaitSet has no attachments"),
            Self::TerminationRequest => write!(f, "Termination request received"),
            Self::Interrupt => write!(f, "Interrupt received"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<TerminationSignal> for RunError {
    fn from(signal: TerminationSignal) -> Self {
        match signal {
            TerminationSignal::Interrupt => Self::Interrupt,
            TerminationSignal::TerminationRequest => Self::TerminationRequest,
        }
    }
}

fn map_poll_error(err: &io::Error) -> RunError {
    match err.raw_os_error() {
        Some(libc::EPERM | libc::EACCES) => RunError::InsufficientPermissions,
        _ => RunError::InternalError,
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`WaitSet`].
#[derive(Debug, Clone)]
pub struct WaitSetBuilder {
    capacity: usize,
    signal_handling_mode: SignalHandlingMode,
}

impl WaitSetBuilder {
    /// Builder with [`DEFAULT_WAITSET_CAPACITY`] and signal handling enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_WAITSET_CAPACITY,
            signal_handling_mode: SignalHandlingMode::default(),
        }
    }

    /// Maximum number of simultaneous attachments.
    #[must_use]
    pub fn capacity(mut self, value: usize) -> Self {
        self.capacity = value;
        self
    }

    /// Whether run loops end on SIGINT/SIGTERM.
    #[must_use]
    pub fn signal_handling_mode(mut self, value: SignalHandlingMode) -> Self {
        self.signal_handling_mode = value;
        self
    }

    /// Create the WaitSet. Installs the process-wide signal handlers when
    /// signal handling is enabled.
    pub fn create(self) -> Result<WaitSet, WaitSetCreateError> {
        if self.signal_handling_mode == SignalHandlingMode::HandleTerminationRequests {
            SignalHandler::install().map_err(|e| {
                log::warn!("[waitset] signal handler installation failed: {}", e);
                WaitSetCreateError::InternalError
            })?;
        }

        let wake = EventFd::new().map_err(|e| {
            log::warn!("[waitset] wake eventfd creation failed: {}", e);
            WaitSetCreateError::InternalError
        })?;

        log::debug!(
            "[waitset] created capacity={} signals={:?}",
            self.capacity,
            self.signal_handling_mode
        );

        Ok(WaitSet {
            registry: Mutex::new(AttachmentRegistry::new(self.capacity)),
            wake,
            waiters: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
            signal_handling_mode: self.signal_handling_mode,
        })
    }
}

impl Default for WaitSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Guard and AttachmentId
// ============================================================================

/// Keeps an attachment alive. Dropping it detaches the attachment before the
/// next wait cycle starts.
///
/// The guard borrows both the WaitSet and the attached listener, so neither
/// can be dropped while the attachment exists.
#[must_use = "dropping the guard detaches immediately"]
pub struct WaitSetGuard<'waitset, 'source> {
    waitset: &'waitset WaitSet,
    key: GuardKey,
    _source: PhantomData<&'source ()>,
}

impl fmt::Debug for WaitSetGuard<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSetGuard").field("key", &self.key).finish()
    }
}

impl Drop for WaitSetGuard<'_, '_> {
    fn drop(&mut self) {
        self.waitset.detach(self.key);
    }
}

/// Identifies one fired attachment during a callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId {
    key: GuardKey,
    kind: FireKind,
}

impl AttachmentId {
    /// `true` if `guard`'s interval elapsed or its listener was notified.
    /// A missed deadline is not an event.
    pub fn has_event_from(&self, guard: &WaitSetGuard<'_, '_>) -> bool {
        self.key == guard.key && self.kind == FireKind::Event
    }

    /// `true` if `guard` is a deadline attachment whose timeout expired
    /// without a notification.
    pub fn has_missed_deadline(&self, guard: &WaitSetGuard<'_, '_>) -> bool {
        self.key == guard.key && self.kind == FireKind::MissedDeadline
    }
}

// ============================================================================
// WaitSet
// ============================================================================

/// Event multiplexer over intervals, deadlines and listeners.
///
/// All methods take `&self`; the WaitSet is `Sync`, so guards can be created
/// and dropped, and [`WaitSet::stop`] called, from other threads while the
/// loop runs. Several threads may run loops at once; every blocked loop is
/// woken by attach, detach and `stop`, but only one of them consumes a
/// stop request.
pub struct WaitSet {
    registry: Mutex<AttachmentRegistry>,
    /// Wakes a blocked run loop after stop() or an attach/detach.
    wake: EventFd,
    /// Run loops currently between snapshot and classification.
    waiters: AtomicUsize,
    stop_requested: AtomicBool,
    signal_handling_mode: SignalHandlingMode,
}

/// One finished cycle of the run loop.
enum Cycle {
    Continue,
    Exit(RunResult),
}

impl WaitSet {
    /// Attach a periodic timer firing every `period` (first fire one period
    /// from now). A zero period fires on every cycle.
    pub fn attach_interval(
        &self,
        period: Duration,
    ) -> Result<WaitSetGuard<'_, 'static>, AttachmentError> {
        self.attach(Attachment::interval(period, Instant::now()))
    }

    /// Attach `source`; fires whenever it has pending events.
    pub fn attach_notification<'source, S>(
        &self,
        source: &'source S,
    ) -> Result<WaitSetGuard<'_, 'source>, AttachmentError>
    where
        S: NotificationSource + ?Sized,
    {
        self.attach(Attachment::notification(source_ref(source)))
    }

    /// Attach `source` with a deadline: fires on notification, or reports a
    /// missed deadline once `timeout` passed since the last fire.
    pub fn attach_deadline<'source, S>(
        &self,
        source: &'source S,
        timeout: Duration,
    ) -> Result<WaitSetGuard<'_, 'source>, AttachmentError>
    where
        S: NotificationSource + ?Sized,
    {
        self.attach(Attachment::deadline(
            source_ref(source),
            timeout,
            Instant::now(),
        ))
    }

    fn attach<'source>(
        &self,
        attachment: Attachment,
    ) -> Result<WaitSetGuard<'_, 'source>, AttachmentError> {
        let key = {
            let mut registry = self.registry.lock();
            registry.insert(attachment).map_err(|err| {
                log::debug!("[waitset] attach rejected: {:?}", err);
                AttachmentError::from(err)
            })?
        };
        log::debug!("[waitset] attached {:?}", key);
        self.wake_if_waiting();

        Ok(WaitSetGuard {
            waitset: self,
            key,
            _source: PhantomData,
        })
    }

    fn detach(&self, key: GuardKey) {
        let removed = self.registry.lock().remove(key);
        if removed {
            log::debug!("[waitset] detached {:?}", key);
            self.wake_if_waiting();
        }
    }

    fn wake_if_waiting(&self) {
        if self.waiters.load(Ordering::Acquire) > 0 {
            self.wake.signal();
        }
    }

    /// Number of live attachments.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// `true` if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Maximum number of simultaneous attachments.
    pub fn capacity(&self) -> usize {
        self.registry.lock().capacity()
    }

    pub fn signal_handling_mode(&self) -> SignalHandlingMode {
        self.signal_handling_mode
    }

    /// Ask the current (or next) run call to return
    /// [`RunResult::StopRequest`] once the callbacks of the current wakeup
    /// have been dispatched. Idempotent; callable from callbacks and other
    /// threads.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.signal();
    }

    /// Run until stopped or signaled, invoking `fn_call` once per fired
    /// attachment.
    pub fn wait_and_process<F>(&self, mut fn_call: F) -> Result<RunResult, RunError>
    where
        F: FnMut(AttachmentId),
    {
        loop {
            if let Cycle::Exit(result) = self.run_cycle(None, &mut fn_call)? {
                log::debug!("[waitset] run loop finished: {}", result);
                return Ok(result);
            }
        }
    }

    /// Block until at least one wakeup happened, dispatch it and return.
    pub fn wait_and_process_once<F>(&self, fn_call: F) -> Result<RunResult, RunError>
    where
        F: FnMut(AttachmentId),
    {
        self.run_single_pass(None, fn_call)
    }

    /// Like [`WaitSet::wait_and_process_once`] but waits at most `timeout`.
    pub fn wait_and_process_once_with_timeout<F>(
        &self,
        fn_call: F,
        timeout: Duration,
    ) -> Result<RunResult, RunError>
    where
        F: FnMut(AttachmentId),
    {
        self.run_single_pass(Some(timeout), fn_call)
    }

    /// One non-blocking pass: dispatch whatever is ready now and return.
    pub fn try_wait_and_process<F>(&self, fn_call: F) -> Result<RunResult, RunError>
    where
        F: FnMut(AttachmentId),
    {
        self.run_single_pass(Some(Duration::ZERO), fn_call)
    }

    fn run_single_pass<F>(
        &self,
        timeout: Option<Duration>,
        mut fn_call: F,
    ) -> Result<RunResult, RunError>
    where
        F: FnMut(AttachmentId),
    {
        match self.run_cycle(timeout, &mut fn_call)? {
            Cycle::Exit(RunResult::TerminationRequest) => Err(RunError::TerminationRequest),
            Cycle::Exit(RunResult::Interrupt) => Err(RunError::Interrupt),
            Cycle::Exit(result) => Ok(result),
            Cycle::Continue => Ok(RunResult::AllEventsHandled),
        }
    }

    fn pending_signal(&self) -> Option<TerminationSignal> {
        match self.signal_handling_mode {
            SignalHandlingMode::HandleTerminationRequests => SignalHandler::last_signal(),
            SignalHandlingMode::Disabled => None,
        }
    }

    /// Waiting -> Dispatching -> (Waiting | Terminated), once.
    fn run_cycle<F>(&self, timeout_cap: Option<Duration>, fn_call: &mut F) -> Result<Cycle, RunError>
    where
        F: FnMut(AttachmentId),
    {
        if self.is_empty() {
            return Err(RunError::NoAttachments);
        }
        if let Some(signal) = self.pending_signal() {
            return Ok(Cycle::Exit(signal.into()));
        }

        let fired = self.wait_for_wakeup(timeout_cap)?;

        if let Some(signal) = self.pending_signal() {
            return Ok(Cycle::Exit(signal.into()));
        }

        for id in fired {
            // A callback earlier in this cycle may have dropped this guard.
            if self.registry.lock().contains(id.key) {
                fn_call(id);
            }
        }

        if self.stop_requested.swap(false, Ordering::AcqRel) {
            self.wake.drain();
            return Ok(Cycle::Exit(RunResult::StopRequest));
        }
        Ok(Cycle::Continue)
    }

    /// Block until the earliest timer, a readable listener, a wake request or
    /// a signal, then classify every attachment.
    fn wait_for_wakeup(&self, timeout_cap: Option<Duration>) -> Result<Vec<AttachmentId>, RunError> {
        // Announce the wait before snapshotting, so an attach racing with the
        // snapshot either lands in it or signals the wake descriptor.
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let result = self.poll_and_classify(timeout_cap);
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn poll_and_classify(&self, timeout_cap: Option<Duration>) -> Result<Vec<AttachmentId>, RunError> {
        let mut poll_set = PollSet::default();
        let mut polled_sources = Vec::new();

        let wake_index = poll_set.push(self.wake.as_raw_fd());
        if self.signal_handling_mode == SignalHandlingMode::HandleTerminationRequests {
            if let Some(fd) = SignalHandler::wake_fd() {
                poll_set.push(fd);
            }
        }

        let timeout = {
            let registry = self.registry.lock();
            if registry.is_empty() {
                return Err(RunError::NoAttachments);
            }

            for (key, attachment) in registry.iter() {
                if let Some(source) = attachment.source() {
                    polled_sources.push((key, poll_set.push(source.fd)));
                }
            }

            let now = Instant::now();
            let until_timer = earliest_deadline(registry.iter().map(|(_, attachment)| attachment))
                .map(|deadline| deadline.saturating_duration_since(now));
            match (until_timer, timeout_cap) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };

        log::trace!(
            "[waitset] waiting timeout={:?} descriptors={}",
            timeout,
            polled_sources.len()
        );

        match poll_set.wait(timeout) {
            Ok(PollOutcome::Ready) => {
                // Concurrent loops must see the wake too; the last one out drains it.
                if poll_set.is_ready(wake_index) && self.waiters.load(Ordering::Acquire) == 1 {
                    self.wake.drain();
                }
            }
            Ok(PollOutcome::Timeout | PollOutcome::Interrupted) => {}
            Err(err) => {
                log::warn!("[waitset] poll failed: {}", err);
                return Err(map_poll_error(&err));
            }
        }

        let signaled: HashSet<GuardKey> = polled_sources
            .iter()
            .filter(|(_, index)| poll_set.is_ready(*index))
            .map(|(key, _)| *key)
            .collect();

        let mut registry = self.registry.lock();
        let now = Instant::now();
        let fired = registry
            .iter_mut()
            .filter_map(|(key, attachment)| {
                attachment
                    .classify(now, signaled.contains(&key))
                    .map(|kind| AttachmentId { key, kind })
            })
            .collect();
        Ok(fired)
    }
}

fn source_ref<S: NotificationSource + ?Sized>(source: &S) -> SourceRef {
    SourceRef {
        id: source.source_id(),
        fd: source.as_raw_fd(),
    }
}

impl fmt::Debug for WaitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("WaitSet")
            .field("len", &registry.len())
            .field("capacity", &registry.capacity())
            .field("signal_handling_mode", &self.signal_handling_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests;
