//! Retry tracker: maps a transfer's identity to the retry-policy state
//! object obtained for that logical request.

use crate::retry::RetryState;
use crate::transfer::TransferId;
use std::collections::HashMap;

#[derive(Default)]
pub struct RetryTracker {
    states: HashMap<TransferId, Box<dyn RetryState>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TransferId, state: Box<dyn RetryState>) {
        self.states.insert(id, state);
    }

    pub fn remove(&mut self, id: TransferId) -> Option<Box<dyn RetryState>> {
        self.states.remove(&id)
    }

    pub fn get_mut(&mut self, id: TransferId) -> Option<&mut Box<dyn RetryState>> {
        self.states.get_mut(&id)
    }
}
