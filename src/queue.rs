//! Admission queue: FIFO of transfers awaiting capacity. Lives inside the
//! gateway's shared mutex; only the reactor thread removes, any requester
//! thread may append.

use crate::transfer::Transfer;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
pub struct AdmissionQueue {
    items: VecDeque<Arc<Transfer>>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, transfer: Arc<Transfer>) {
        self.items.push_back(transfer);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Transfer>> {
        self.items.pop_front()
    }

    pub fn front_expected_size(&self) -> Option<u64> {
        self.items.front().map(|t| t.expected_size)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
