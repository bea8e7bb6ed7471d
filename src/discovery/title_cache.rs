use std::collections::{HashMap, VecDeque};

pub const DEFAULT_TITLE_CACHE_CAPACITY: usize = 100;

/// Bounded FIFO of the last readable title per window.
///
/// Windows on an inactive desktop lose their accessibility title; this keeps
/// the last one seen so they do not show up blank.
#[derive(Debug, Clone)]
pub struct TitleCache {
    capacity: usize,
    titles: HashMap<u32, String>,
    order: VecDeque<u32>,
}

impl Default for TitleCache {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_CACHE_CAPACITY)
    }
}

impl TitleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            titles: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Store `title`, moving the window to the back of the eviction queue
    pub fn insert(&mut self, window_id: u32, title: impl Into<String>) {
        if self.titles.insert(window_id, title.into()).is_some() {
            self.order.retain(|id| *id != window_id);
        }
        self.order.push_back(window_id);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.titles.remove(&evicted);
            }
        }
    }

    /// Cached title, if present and non-empty
    pub fn get(&self, window_id: u32) -> Option<&str> {
        self.titles
            .get(&window_id)
            .map(String::as_str)
            .filter(|title| !title.is_empty())
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn clear(&mut self) {
        self.titles.clear();
        self.order.clear();
    }
}
