//! Guardian set holder

use crate::domain::GuardianSet;
use crate::ports::GuardianSetProvider;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Current guardian set, swapped atomically on rotation.
#[derive(Default)]
pub struct GuardianSetState {
    current: RwLock<Option<Arc<GuardianSet>>>,
}

impl GuardianSetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(set: GuardianSet) -> Self {
        let state = Self::new();
        state.set(set);
        state
    }

    /// Replace the active set. Existing aggregation states keep the
    /// snapshot they were created with.
    pub fn set(&self, set: GuardianSet) {
        info!(
            index = set.index,
            keys = ?set.keys_as_hex(),
            "Guardian set updated"
        );
        *self.current.write() = Some(Arc::new(set));
    }
}

impl GuardianSetProvider for GuardianSetState {
    fn current_set(&self) -> Option<Arc<GuardianSet>> {
        self.current.read().clone()
    }
}
