use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use changesync_model::ChangesetID;
use chrono::{DateTime, Utc};

/// Priority bands for scheduled syncs. `High` is reserved for syncs somebody
/// explicitly asked for and always runs ahead of the regular schedule.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub enum SyncPriority {
    #[default]
    Normal,
    High,
}

/// A changeset waiting for its next sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledSync {
    pub changeset_id: ChangesetID,
    pub next_sync: DateTime<Utc>,
    pub priority: SyncPriority,
}

impl ScheduledSync {
    pub fn new(changeset_id: ChangesetID, next_sync: DateTime<Utc>) -> Self {
        Self {
            changeset_id,
            next_sync,
            priority: SyncPriority::Normal,
        }
    }

    /// Entry for a changeset that was asked for out of band and is not (or no
    /// longer) scheduled. The zero time puts it ahead of everything else.
    pub fn prioritized(changeset_id: ChangesetID) -> Self {
        Self {
            changeset_id,
            next_sync: DateTime::<Utc>::MIN_UTC,
            priority: SyncPriority::High,
        }
    }
}

/// Dispatch order: higher priority first, then the soonest due, then the
/// lowest id so the order is total.
impl Ord for ScheduledSync {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.next_sync.cmp(&other.next_sync))
            .then_with(|| self.changeset_id.cmp(&other.changeset_id))
    }
}

impl PartialOrd for ScheduledSync {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of scheduled syncs with an id index for O(1) lookups.
///
/// The queue holds at most one entry per changeset and has no interior
/// locking: it belongs to exactly one code host task, and other tasks reach
/// it only through that task's mailbox.
#[derive(Default)]
pub struct SyncQueue {
    items: Vec<ScheduledSync>,
    index: HashMap<ChangesetID, usize>,
}

impl fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncQueue")
            .field("len", &self.items.len())
            .field("head", &self.items.first())
            .finish()
    }
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts new changesets and updates existing ones in place. An entry
    /// that is already `High` stays `High` until it is removed.
    pub fn upsert<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = ScheduledSync>,
    {
        for item in items {
            match self.index.get(&item.changeset_id).copied() {
                Some(pos) => {
                    let existing = &mut self.items[pos];
                    let priority = existing.priority.max(item.priority);
                    *existing = ScheduledSync { priority, ..item };
                    self.fix(pos);
                }
                None => {
                    let pos = self.items.len();
                    self.index.insert(item.changeset_id, pos);
                    self.items.push(item);
                    self.sift_up(pos);
                }
            }
        }
    }

    /// Next entry to dispatch, if any.
    pub fn peek(&self) -> Option<&ScheduledSync> {
        self.items.first()
    }

    pub fn pop(&mut self) -> Option<ScheduledSync> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.swap(0, last);
        let item = self.items.pop()?;
        self.index.remove(&item.changeset_id);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(item)
    }

    pub fn get(&self, changeset_id: ChangesetID) -> Option<&ScheduledSync> {
        self.index
            .get(&changeset_id)
            .map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, changeset_id: ChangesetID) -> bool {
        self.index.contains_key(&changeset_id)
    }

    /// Removes the entry for `changeset_id`; absent ids are ignored.
    pub fn remove(&mut self, changeset_id: ChangesetID) -> Option<ScheduledSync> {
        let pos = *self.index.get(&changeset_id)?;
        let last = self.items.len() - 1;
        self.swap(pos, last);
        let item = self.items.pop()?;
        self.index.remove(&item.changeset_id);
        if pos < self.items.len() {
            self.fix(pos);
        }
        Some(item)
    }

    /// Entries in heap order, which is not dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledSync> {
        self.items.iter()
    }

    /// Number of entries that should already have run at `now`.
    pub fn overdue(&self, now: DateTime<Utc>) -> usize {
        self.items.iter().filter(|item| item.next_sync < now).count()
    }

    fn fix(&mut self, pos: usize) {
        if !self.sift_up(pos) {
            self.sift_down(pos);
        }
    }

    fn sift_up(&mut self, mut pos: usize) -> bool {
        let mut moved = false;
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.items[pos] >= self.items[parent] {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
            moved = true;
        }
        moved
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.items[right] < self.items[left] {
                right
            } else {
                left
            };
            if self.items[child] >= self.items[pos] {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.index.insert(self.items[a].changeset_id, a);
        self.index.insert(self.items[b].changeset_id, b);
    }
}
