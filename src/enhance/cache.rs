use std::collections::{HashMap, VecDeque};

use super::EnhancementResult;

/// Fingerprint-keyed results; once `capacity` is exceeded the oldest
/// insertion is evicted.
#[derive(Debug)]
pub struct EnhancementCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, EnhancementResult>,
}

impl EnhancementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&EnhancementResult> {
        self.entries.get(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: String, result: EnhancementResult) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(fingerprint.clone(), result).is_none() {
            self.order.push_back(fingerprint);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
