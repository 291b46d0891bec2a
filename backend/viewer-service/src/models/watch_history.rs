//! Bounded, recency-ordered, duplicate-free list of watched videos.
use std::collections::VecDeque;
use uuid::Uuid;

pub const DEFAULT_WATCH_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHistory {
    entries: VecDeque<Uuid>,
    capacity: usize,
}

impl WatchHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_WATCH_HISTORY_CAPACITY) + 1),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from a persisted sequence. Later duplicates and anything past
    /// capacity are dropped so a damaged row cannot break the invariants.
    pub fn from_entries(entries: impl IntoIterator<Item = Uuid>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        for id in entries {
            if history.entries.len() == history.capacity {
                break;
            }
            if !history.entries.contains(&id) {
                history.entries.push_back(id);
            }
        }
        history
    }

    /// Move `video_id` to the front, evicting the oldest entry when over
    /// capacity. Returns the evicted id, if any.
    pub fn record(&mut self, video_id: Uuid) -> Option<Uuid> {
        if let Some(pos) = self.entries.iter().position(|id| *id == video_id) {
            self.entries.remove(pos);
        }
        self.entries.push_front(video_id);

        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn most_recent(&self) -> Option<Uuid> {
        self.entries.front().copied()
    }

    pub fn contains(&self, video_id: &Uuid) -> bool {
        self.entries.contains(video_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Uuid> {
        self.entries.into()
    }
}
