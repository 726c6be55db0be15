// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wait conditions stored in the attachment registry.

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Listener side of a notification or deadline attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SourceRef {
    pub(super) id: u64,
    pub(super) fd: RawFd,
}

/// How an attachment fired in one wakeup cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FireKind {
    /// Interval elapsed or listener signaled.
    Event,
    /// Deadline expired without a notification.
    MissedDeadline,
}

#[derive(Debug)]
pub(super) enum Attachment {
    /// `next_fire` is `None` once the schedule runs past what `Instant` can
    /// represent; such an interval never fires.
    Interval {
        period: Duration,
        next_fire: Option<Instant>,
    },
    /// `expiry` is `None` when the timeout is out of range; the deadline then
    /// only fires on notification.
    Deadline {
        source: SourceRef,
        timeout: Duration,
        expiry: Option<Instant>,
    },
    Notification {
        source: SourceRef,
    },
}

impl Attachment {
    pub(super) fn interval(period: Duration, now: Instant) -> Self {
        Self::Interval {
            period,
            next_fire: now.checked_add(period),
        }
    }

    pub(super) fn deadline(source: SourceRef, timeout: Duration, now: Instant) -> Self {
        Self::Deadline {
            source,
            timeout,
            expiry: now.checked_add(timeout),
        }
    }

    pub(super) fn notification(source: SourceRef) -> Self {
        Self::Notification { source }
    }

    /// The listener to poll, if any.
    pub(super) fn source(&self) -> Option<SourceRef> {
        match self {
            Self::Interval { .. } => None,
            Self::Deadline { source, .. } | Self::Notification { source } => Some(*source),
        }
    }

    /// Point in time at which this attachment fires without a notification.
    pub(super) fn next_deadline(&self) -> Option<Instant> {
        match self {
            Self::Interval { next_fire, .. } => *next_fire,
            Self::Deadline { expiry, .. } => *expiry,
            Self::Notification { .. } => None,
        }
    }

    /// Decide whether this attachment fired at `now`, given whether its
    /// listener was readable, and re-arm its timer if so.
    pub(super) fn classify(&mut self, now: Instant, signaled: bool) -> Option<FireKind> {
        match self {
            Self::Interval { period, next_fire } => {
                let due = (*next_fire)?;
                if now < due {
                    return None;
                }
                *next_fire = advance_interval(due, *period, now);
                Some(FireKind::Event)
            }
            Self::Deadline {
                timeout, expiry, ..
            } => {
                let kind = if signaled {
                    FireKind::Event
                } else if expiry.is_some_and(|expiry| now >= expiry) {
                    FireKind::MissedDeadline
                } else {
                    return None;
                };
                *expiry = now.checked_add(*timeout);
                Some(kind)
            }
            Self::Notification { .. } => signaled.then_some(FireKind::Event),
        }
    }
}

/// Next fire time after an interval fired at `now`. Elapsed periods collapse
/// into the single fire just reported; the schedule stays on the original
/// phase. A zero period fires on every cycle. `None` if the next slot is not
/// representable.
pub(super) fn advance_interval(
    next_fire: Instant,
    period: Duration,
    now: Instant,
) -> Option<Instant> {
    if period.is_zero() {
        return Some(now);
    }

    let overdue = now.saturating_duration_since(next_fire).as_nanos();
    let skipped = overdue / period.as_nanos() + 1;
    match u32::try_from(skipped)
        .ok()
        .and_then(|n| period.checked_mul(n))
    {
        Some(step) => next_fire.checked_add(step),
        None => now.checked_add(period),
    }
}

/// Earliest timer deadline across `attachments`, `None` if only
/// notifications are attached.
pub(super) fn earliest_deadline<'a, I>(attachments: I) -> Option<Instant>
where
    I: IntoIterator<Item = &'a Attachment>,
{
    attachments
        .into_iter()
        .filter_map(Attachment::next_deadline)
        .min()
}
