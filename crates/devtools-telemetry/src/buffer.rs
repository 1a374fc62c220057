use std::collections::VecDeque;

use crate::events::TelemetryEvent;

/// Ordered, append-only event buffer with optional FIFO eviction.
#[derive(Clone, Debug)]
pub struct CollectorBuffer<T = TelemetryEvent> {
    items: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> CollectorBuffer<T> {
    pub fn unbounded() -> Self {
        Self {
            items: VecDeque::new(),
            capacity: None,
        }
    }

    /// Buffer that keeps only the newest `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity: Some(capacity),
        }
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an item, returning the evicted oldest item if the cap was exceeded.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        match self.capacity {
            Some(capacity) if self.items.len() > capacity => self.items.pop_front(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for CollectorBuffer<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// First `limit` characters of a response body.
pub fn truncate_body(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}
