//! VAA persistence with the PythNet in-memory cache in front

use crate::domain::{ChainId, MessageId, StoreError, Vaa};
use crate::ports::VaaStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

struct CachedVaa {
    vaa: Vaa,
    updated_at: Instant,
}

/// Routes PythNet VAAs to a TTL-bounded in-memory map and everything else
/// to the persistent [`VaaStore`].
pub struct ArtifactStore {
    store: Arc<dyn VaaStore>,
    pythnet: Mutex<HashMap<MessageId, CachedVaa>>,
    pythnet_ttl: Duration,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn VaaStore>, pythnet_ttl: Duration) -> Self {
        Self {
            store,
            pythnet: Mutex::new(HashMap::new()),
            pythnet_ttl,
        }
    }

    pub async fn store_vaa(&self, vaa: &Vaa) -> Result<(), StoreError> {
        if vaa.emitter_chain == ChainId::PYTHNET {
            self.pythnet.lock().insert(
                vaa.message_id(),
                CachedVaa {
                    vaa: vaa.clone(),
                    updated_at: Instant::now(),
                },
            );
            return Ok(());
        }
        self.store.store_vaa(vaa).await
    }

    pub async fn get_vaa_bytes(&self, id: &MessageId) -> Result<Vec<u8>, StoreError> {
        if id.emitter_chain == ChainId::PYTHNET {
            return self
                .pythnet
                .lock()
                .get(id)
                .map(|entry| entry.vaa.marshal())
                .ok_or(StoreError::NotFound);
        }
        self.store.get_vaa_bytes(id).await
    }

    /// Whether a completed VAA exists for `id`. Lookup failures are logged
    /// and reported as absent.
    pub async fn has_vaa(&self, id: &MessageId) -> bool {
        if id.emitter_chain == ChainId::PYTHNET {
            return self.pythnet.lock().contains_key(id);
        }

        match self.store.has_vaa(id).await {
            Ok(found) => found,
            Err(e) => {
                error!(message_id = %id, error = %e, "Failed to look up VAA in store");
                false
            }
        }
    }

    /// Drop cached PythNet VAAs older than the TTL. Returns how many went.
    pub fn prune_pythnet(&self, now: Instant) -> usize {
        let mut cache = self.pythnet.lock();
        let before = cache.len();
        let ttl = self.pythnet_ttl;
        cache.retain(|_, entry| now.saturating_duration_since(entry.updated_at) <= ttl);
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "Pruned PythNet VAA cache");
        }
        removed
    }

    pub fn pythnet_cache_len(&self) -> usize {
        self.pythnet.lock().len()
    }
}
