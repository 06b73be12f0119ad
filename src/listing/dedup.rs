use std::collections::{HashSet, VecDeque};

/// Ids a streaming listing has already emitted.
///
/// Unbounded unless a capacity is given; with a capacity the oldest ids are
/// forgotten first, which means an item older than the last `capacity`
/// emissions can surface again if the server serves it a second time.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenSet {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    /// Record `id`. Returns `true` when it had not been seen before.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());

        if let Some(capacity) = self.capacity {
            self.order.push_back(id.to_string());
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
