//! Per-device conversations registry
//!
//! Maps device ids to their live [`Conversations`]. Installing a store for a
//! device that already has one shuts the old store down, so callers still
//! waiting on it are released instead of parked forever.

use super::interface::Conversations;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Live conversation stores, one per device
#[derive(Default)]
pub struct ConversationsRegistry {
    devices: RwLock<HashMap<String, Arc<Conversations>>>,
}

impl ConversationsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the store for a device
    ///
    /// Returns the retired store, already shut down, if one was installed.
    pub async fn install(
        &self,
        device_id: impl Into<String>,
        conversations: Arc<Conversations>,
    ) -> Option<Arc<Conversations>> {
        let device_id = device_id.into();
        let previous = self
            .devices
            .write()
            .await
            .insert(device_id.clone(), conversations);

        match previous {
            Some(previous) => {
                info!("Replacing conversations store for device {}", device_id);
                previous.shutdown();
                Some(previous)
            }
            None => {
                debug!("Installed conversations store for device {}", device_id);
                None
            }
        }
    }

    /// Store of a device, if installed
    pub async fn lookup(&self, device_id: &str) -> Option<Arc<Conversations>> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Remove and shut down the store of a device
    pub async fn remove(&self, device_id: &str) -> Option<Arc<Conversations>> {
        let removed = self.devices.write().await.remove(device_id);
        if let Some(conversations) = &removed {
            info!("Removing conversations store for device {}", device_id);
            conversations.shutdown();
        }
        removed
    }

    /// Ids of all devices with an installed store
    pub async fn device_ids(&self) -> Vec<String> {
        self.devices.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}
