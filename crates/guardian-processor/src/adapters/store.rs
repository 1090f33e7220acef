//! In-memory VAA store adapter

use crate::domain::{MessageId, StoreError, Vaa};
use crate::ports::VaaStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Marshalled VAAs keyed by message id. For tests and single-process runs.
#[derive(Default)]
pub struct InMemoryVaaStore {
    vaas: RwLock<HashMap<MessageId, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryVaaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vaas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaas.read().is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<Vec<u8>> {
        self.vaas.read().get(id).cloned()
    }

    /// Make every subsequent `store_vaa` fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VaaStore for InMemoryVaaStore {
    async fn has_vaa(&self, id: &MessageId) -> Result<bool, StoreError> {
        Ok(self.vaas.read().contains_key(id))
    }

    async fn get_vaa_bytes(&self, id: &MessageId) -> Result<Vec<u8>, StoreError> {
        self.get(id).ok_or(StoreError::NotFound)
    }

    async fn store_vaa(&self, vaa: &Vaa) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        self.vaas.write().insert(vaa.message_id(), vaa.marshal());
        Ok(())
    }
}
