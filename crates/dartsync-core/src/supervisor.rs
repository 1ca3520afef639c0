// ── Supervisor ──
//
// Explicit registry of running pairings, keyed by `PairingId`. Creating
// starts the pairing; destroying shuts it down (match first, then board)
// and forgets it.

use dartsync_api::DartsApi;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use crate::config::{PairingConfig, PairingId};
use crate::error::CoreError;
use crate::pairing::{Pairing, PairingHandle};

#[derive(Default)]
pub struct Supervisor {
    pairings: DashMap<PairingId, PairingHandle>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pairing and register it. Rejects an id already in use.
    pub async fn create<A: DartsApi>(
        &self,
        api: A,
        config: PairingConfig,
    ) -> Result<PairingHandle, CoreError> {
        let id = config.id.clone();
        if self.pairings.contains_key(&id) {
            return Err(CoreError::PairingExists { id: id.to_string() });
        }

        let handle = Pairing::start(api, config).await?;

        // A concurrent create may have won while this one was starting.
        match self.pairings.entry(id.clone()) {
            Entry::Occupied(_) => {
                handle.shutdown().await;
                Err(CoreError::PairingExists { id: id.to_string() })
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                info!(pairing = %id, "pairing registered");
                Ok(handle)
            }
        }
    }

    pub fn get(&self, id: &PairingId) -> Option<PairingHandle> {
        self.pairings.get(id).map(|entry| entry.value().clone())
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<PairingId> {
        let mut ids: Vec<PairingId> = self.pairings.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Shut a pairing down and forget it.
    pub async fn destroy(&self, id: &PairingId) -> Result<(), CoreError> {
        let (_, handle) = self
            .pairings
            .remove(id)
            .ok_or_else(|| CoreError::PairingNotFound { id: id.to_string() })?;
        handle.shutdown().await;
        info!(pairing = %id, "pairing destroyed");
        Ok(())
    }

    /// Shut every pairing down. Returns how many were running.
    pub async fn shutdown_all(&self) -> usize {
        let ids = self.ids();
        let mut stopped = 0;
        for id in &ids {
            match self.destroy(id).await {
                Ok(()) => stopped += 1,
                Err(e) => warn!(pairing = %id, error = %e, "pairing vanished during shutdown"),
            }
        }
        stopped
    }
}
