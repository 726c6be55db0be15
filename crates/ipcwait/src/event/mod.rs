// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event service - single-source wakeups for the WaitSet.
//!
//! An [`EventService`] pairs any number of [`Notifier`]s with any number of
//! [`Listener`]s: every `notify()` queues an [`EventId`] at each listener
//! alive at that moment and makes the listener's descriptor readable. The
//! descriptor stays readable until the pending ids are consumed, which is
//! what lets a [`WaitSet`](crate::WaitSet) multiplex listeners with `poll`.
//!
//! ```text
//! Notifier --notify(id)--> EventService --push id + eventfd write--> Listener(s)
//!                                                                      |
//!                                                  WaitSet polls ------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use ipcwait::{EventId, EventServiceBuilder};
//!
//! let service = EventServiceBuilder::new().create();
//! let listener = service.listener()?;
//! let notifier = service.notifier()?;
//!
//! notifier.notify_with_custom_event_id(EventId::new(7))?;
//! assert_eq!(listener.try_wait_one()?, Some(EventId::new(7)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod fd;

use crate::config::{DEFAULT_EVENT_ID_MAX_VALUE, DEFAULT_MAX_LISTENERS, DEFAULT_MAX_NOTIFIERS};
use crate::waitset::reactor::{poll_readable, PollOutcome};
use fd::EventFd;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Anything a [`WaitSet`](crate::WaitSet) can attach as a notification or
/// deadline source.
///
/// The descriptor must be readable exactly while the source has pending
/// events. `source_id` must be unique per live source; the WaitSet uses it to
/// reject duplicate attachments.
pub trait NotificationSource: AsRawFd {
    /// Stable, process-unique identity of this source.
    fn source_id(&self) -> u64;
}

/// Identifier carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventId(u64);

impl EventId {
    /// Create an event id from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value.
    #[must_use]
    pub const fn as_value(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures of [`EventService::listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerCreateError {
    /// The service already has its maximum number of listeners.
    ExceedsMaxSupportedListeners,
    /// The underlying wakeup descriptor could not be created.
    ResourceCreationFailed,
}

impl fmt::Display for ListenerCreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExceedsMaxSupportedListeners => write!(f, "Maximum number of listeners exceeded"),
            Self::ResourceCreationFailed => write!(f, "Listener wakeup resource creation failed"),
        }
    }
}

impl std::error::Error for ListenerCreateError {}

/// Failures of [`EventService::notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierCreateError {
    /// The service already has its maximum number of notifiers.
    ExceedsMaxSupportedNotifiers,
}

impl fmt::Display for NotifierCreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExceedsMaxSupportedNotifiers => write!(f, "Maximum number of notifiers exceeded"),
        }
    }
}

impl std::error::Error for NotifierCreateError {}

/// Failures of [`Notifier::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierNotifyError {
    /// The event id is larger than the service's configured maximum.
    EventIdOutOfBounds,
}

impl fmt::Display for NotifierNotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventIdOutOfBounds => write!(f, "Event id out of bounds"),
        }
    }
}

impl std::error::Error for NotifierNotifyError {}

/// Failures of the listener wait calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerWaitError {
    /// A signal interrupted the wait.
    InterruptSignal,
    /// The underlying wait failed.
    InternalFailure,
}

impl fmt::Display for ListenerWaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterruptSignal => write!(f, "Wait interrupted by signal"),
            Self::InternalFailure => write!(f, "Internal failure while waiting"),
        }
    }
}

impl std::error::Error for ListenerWaitError {}

// ============================================================================
// Service
// ============================================================================

/// Builder for an [`EventService`].
#[derive(Debug, Clone)]
pub struct EventServiceBuilder {
    max_listeners: usize,
    max_notifiers: usize,
    event_id_max_value: u64,
}

impl EventServiceBuilder {
    /// Builder initialized with the defaults from [`crate::config`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_listeners: DEFAULT_MAX_LISTENERS,
            max_notifiers: DEFAULT_MAX_NOTIFIERS,
            event_id_max_value: DEFAULT_EVENT_ID_MAX_VALUE,
        }
    }

    /// Maximum number of simultaneously alive listeners.
    #[must_use]
    pub fn max_listeners(mut self, value: usize) -> Self {
        self.max_listeners = value;
        self
    }

    /// Maximum number of simultaneously alive notifiers.
    #[must_use]
    pub fn max_notifiers(mut self, value: usize) -> Self {
        self.max_notifiers = value;
        self
    }

    /// Largest event id notifiers may emit.
    #[must_use]
    pub fn event_id_max_value(mut self, value: u64) -> Self {
        self.event_id_max_value = value;
        self
    }

    /// Create the service.
    #[must_use]
    pub fn create(self) -> EventService {
        EventService {
            inner: Arc::new(ServiceInner {
                max_listeners: self.max_listeners,
                max_notifiers: self.max_notifiers,
                event_id_max_value: self.event_id_max_value,
                listeners: Mutex::new(Vec::new()),
                notifier_count: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for EventServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for the listeners and notifiers of one event channel.
#[derive(Clone)]
pub struct EventService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    max_listeners: usize,
    max_notifiers: usize,
    event_id_max_value: u64,
    listeners: Mutex<Vec<Weak<ListenerShared>>>,
    notifier_count: AtomicUsize,
}

impl EventService {
    /// Create a listener that receives every subsequent notification.
    pub fn listener(&self) -> Result<Listener, ListenerCreateError> {
        let mut listeners = self.inner.listeners.lock();
        listeners.retain(|weak| weak.strong_count() > 0);
        if listeners.len() >= self.inner.max_listeners {
            log::debug!(
                "[event] listener rejected, {} of {} in use",
                listeners.len(),
                self.inner.max_listeners
            );
            return Err(ListenerCreateError::ExceedsMaxSupportedListeners);
        }

        let fd = EventFd::new().map_err(|e| {
            log::warn!("[event] listener eventfd creation failed: {}", e);
            ListenerCreateError::ResourceCreationFailed
        })?;

        let shared = Arc::new(ListenerShared {
            fd,
            pending: Mutex::new(VecDeque::new()),
        });
        listeners.push(Arc::downgrade(&shared));

        Ok(Listener {
            id: next_source_id(),
            shared,
            service: Arc::clone(&self.inner),
        })
    }

    /// Create a notifier emitting `EventId::default()` on [`Notifier::notify`].
    pub fn notifier(&self) -> Result<Notifier, NotifierCreateError> {
        self.notifier_with_default_event_id(EventId::default())
    }

    /// Create a notifier emitting `event_id` on [`Notifier::notify`].
    pub fn notifier_with_default_event_id(
        &self,
        event_id: EventId,
    ) -> Result<Notifier, NotifierCreateError> {
        let claimed = self
            .inner
            .notifier_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.inner.max_notifiers).then_some(count + 1)
            });
        if claimed.is_err() {
            return Err(NotifierCreateError::ExceedsMaxSupportedNotifiers);
        }

        Ok(Notifier {
            service: Arc::clone(&self.inner),
            default_event_id: event_id,
        })
    }

    /// Number of currently alive listeners.
    pub fn number_of_listeners(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Number of currently alive notifiers.
    pub fn number_of_notifiers(&self) -> usize {
        self.inner.notifier_count.load(Ordering::Acquire)
    }

    /// Largest event id notifiers may emit.
    pub fn event_id_max_value(&self) -> u64 {
        self.inner.event_id_max_value
    }
}

impl fmt::Debug for EventService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventService")
            .field("max_listeners", &self.inner.max_listeners)
            .field("max_notifiers", &self.inner.max_notifiers)
            .field("event_id_max_value", &self.inner.event_id_max_value)
            .finish()
    }
}

fn next_source_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Listener
// ============================================================================

struct ListenerShared {
    fd: EventFd,
    /// Distinct pending ids in arrival order. The fd is signaled while
    /// non-empty; both are only touched under this lock.
    pending: Mutex<VecDeque<EventId>>,
}

impl ListenerShared {
    fn push(&self, event_id: EventId) {
        let mut pending = self.pending.lock();
        if !pending.contains(&event_id) {
            pending.push_back(event_id);
        }
        self.fd.signal();
    }

    fn pop(&self) -> Option<EventId> {
        let mut pending = self.pending.lock();
        let event_id = pending.pop_front();
        if pending.is_empty() {
            self.fd.drain();
        }
        event_id
    }
}

/// Receiving end of an event service.
pub struct Listener {
    id: u64,
    shared: Arc<ListenerShared>,
    service: Arc<ServiceInner>,
}

impl Listener {
    /// Take one pending event id without blocking.
    pub fn try_wait_one(&self) -> Result<Option<EventId>, ListenerWaitError> {
        Ok(self.shared.pop())
    }

    /// Wait up to `timeout` for one event id. `Ok(None)` on timeout.
    pub fn timed_wait_one(&self, timeout: Duration) -> Result<Option<EventId>, ListenerWaitError> {
        self.wait_one(Some(timeout))
    }

    /// Block until an event id arrives.
    pub fn blocking_wait_one(&self) -> Result<EventId, ListenerWaitError> {
        loop {
            if let Some(event_id) = self.wait_one(None)? {
                return Ok(event_id);
            }
        }
    }

    /// Consume every pending event id without blocking.
    pub fn try_wait_all<F: FnMut(EventId)>(&self, mut callback: F) -> Result<(), ListenerWaitError> {
        while let Some(event_id) = self.shared.pop() {
            callback(event_id);
        }
        Ok(())
    }

    fn wait_one(&self, timeout: Option<Duration>) -> Result<Option<EventId>, ListenerWaitError> {
        // An unrepresentable deadline waits without bound.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if let Some(event_id) = self.shared.pop() {
                return Ok(Some(event_id));
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match poll_readable(self.shared.fd.as_raw_fd(), remaining) {
                Ok(PollOutcome::Ready | PollOutcome::Timeout) => {}
                Ok(PollOutcome::Interrupted) => return Err(ListenerWaitError::InterruptSignal),
                Err(e) => {
                    log::warn!("[event] listener wait failed: {}", e);
                    return Err(ListenerWaitError::InternalFailure);
                }
            }
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.shared.fd.as_raw_fd()
    }
}

impl NotificationSource for Listener {
    fn source_id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("fd", &self.shared.fd.as_raw_fd())
            .finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let target = Arc::as_ptr(&self.shared);
        self.service
            .listeners
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), target));
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Sending end of an event service.
pub struct Notifier {
    service: Arc<ServiceInner>,
    default_event_id: EventId,
}

impl Notifier {
    /// Notify every alive listener with the default event id. Returns the
    /// number of listeners reached.
    pub fn notify(&self) -> Result<usize, NotifierNotifyError> {
        self.notify_with_custom_event_id(self.default_event_id)
    }

    /// Notify every alive listener with `event_id`.
    pub fn notify_with_custom_event_id(&self, event_id: EventId) -> Result<usize, NotifierNotifyError> {
        if event_id.as_value() > self.service.event_id_max_value {
            return Err(NotifierNotifyError::EventIdOutOfBounds);
        }

        let targets: Vec<Arc<ListenerShared>> = {
            let mut listeners = self.service.listeners.lock();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in &targets {
            listener.push(event_id);
        }

        log::trace!(
            "[event] notified {} listener(s) with id {}",
            targets.len(),
            event_id.as_value()
        );
        Ok(targets.len())
    }

    /// The id emitted by [`Notifier::notify`].
    pub fn default_event_id(&self) -> EventId {
        self.default_event_id
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("default_event_id", &self.default_event_id)
            .finish()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.service.notifier_count.fetch_sub(1, Ordering::AcqRel);
    }
}
