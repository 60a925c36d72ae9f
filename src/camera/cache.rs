use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::camera::types::{CameraCapabilities, ProtocolDetectionResult, Tristate};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub detection: Option<ProtocolDetectionResult>,
    #[serde(default)]
    pub capabilities: Option<CameraCapabilities>,
}

pub type CacheSnapshot = HashMap<String, CacheEntry>;

/// Per-camera detection and capability cache. Entries are only ever dropped by
/// [`CapabilityCache::invalidate`]: a failed request never erases a previous detection.
#[derive(Clone, Default)]
pub struct CapabilityCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            entries: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub async fn detection(&self, camera_id: &str) -> Option<ProtocolDetectionResult> {
        let entries = self.entries.read().await;
        entries.get(camera_id).and_then(|e| e.detection.clone())
    }

    pub async fn store_detection(&self, camera_id: &str, result: ProtocolDetectionResult) {
        let mut entries = self.entries.write().await;
        entries.entry(camera_id.to_string()).or_default().detection = Some(result);
    }

    pub async fn capabilities(&self, camera_id: &str) -> Option<CameraCapabilities> {
        let entries = self.entries.read().await;
        entries.get(camera_id).and_then(|e| e.capabilities.clone())
    }

    pub async fn store_capabilities(&self, camera_id: &str, capabilities: CameraCapabilities) {
        let mut entries = self.entries.write().await;
        entries.entry(camera_id.to_string()).or_default().capabilities = Some(capabilities);
    }

    pub async fn profile_g(&self, camera_id: &str) -> Tristate {
        self.capabilities(camera_id)
            .await
            .map(|c| c.supports_onvif_profile_g)
            .unwrap_or_default()
    }

    /// Records the Profile G verdict, creating a capability entry if none exists yet.
    pub async fn mark_profile_g(&self, camera_id: &str, supported: bool) {
        let mut entries = self.entries.write().await;
        let caps = entries
            .entry(camera_id.to_string())
            .or_default()
            .capabilities
            .get_or_insert_with(CameraCapabilities::default);
        caps.supports_onvif_profile_g = Tristate::from_bool(supported);
        if !supported {
            caps.has_recording_search = false;
        }
    }

    pub async fn invalidate(&self, camera_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(camera_id).is_some()
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        self.entries.read().await.clone()
    }

    pub async fn restore(&self, snapshot: CacheSnapshot) {
        let mut entries = self.entries.write().await;
        *entries = snapshot;
    }
}
