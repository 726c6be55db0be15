// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::attachment::Attachment;

/// Identity of one attachment: slot index plus a generation id that is never
/// reused within a registry, so a stale key never matches a newer entry in
/// the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GuardKey {
    index: usize,
    id: u64,
}

/// Slot table mapping guard keys to attachments. Iteration follows slot
/// index order, which makes dispatch order reproducible within a cycle.
pub(super) struct AttachmentRegistry {
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    next_id: u64,
    len: usize,
    capacity: usize,
}

struct Entry {
    id: u64,
    attachment: Attachment,
}

/// Reasons an insertion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum InsertError {
    Full,
    DuplicateSource,
}

impl AttachmentRegistry {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            next_id: 1,
            len: 0,
            capacity,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn insert(&mut self, attachment: Attachment) -> Result<GuardKey, InsertError> {
        if let Some(source) = attachment.source() {
            if self.contains_source(source.id) {
                return Err(InsertError::DuplicateSource);
            }
        }
        if self.len >= self.capacity {
            return Err(InsertError::Full);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(None);
                self.entries.len() - 1
            }
        };

        let id = self.next_id;
        self.next_id += 1;

        self.entries[index] = Some(Entry { id, attachment });
        self.len += 1;

        Ok(GuardKey { index, id })
    }

    /// Remove the entry behind `key`. Returns `false` for stale keys.
    pub(super) fn remove(&mut self, key: GuardKey) -> bool {
        let Some(slot) = self.entries.get_mut(key.index) else {
            return false;
        };
        if !slot.as_ref().is_some_and(|entry| entry.id == key.id) {
            return false;
        }

        *slot = None;
        self.free.push(key.index);
        self.len -= 1;
        true
    }

    pub(super) fn contains(&self, key: GuardKey) -> bool {
        matches!(self.entries.get(key.index), Some(Some(entry)) if entry.id == key.id)
    }

    pub(super) fn contains_source(&self, source_id: u64) -> bool {
        self.iter()
            .any(|(_, attachment)| attachment.source().is_some_and(|s| s.id == source_id))
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = (GuardKey, &Attachment)> {
        self.entries.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|entry| (GuardKey { index, id: entry.id }, &entry.attachment))
        })
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = (GuardKey, &mut Attachment)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_mut()
                    .map(|entry| (GuardKey { index, id: entry.id }, &mut entry.attachment))
            })
    }
}
