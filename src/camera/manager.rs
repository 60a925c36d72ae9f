use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::camera::CameraConfig;
use crate::error::{CameraError, CameraResult};

struct ManagedCamera {
    config: CameraConfig,
    // Serialises operations against one device; firmwares wedge under concurrent load.
    op_lock: Arc<Mutex<()>>,
}

/// Registry of camera records keyed by id.
pub struct CameraManager {
    cameras: Arc<RwLock<HashMap<String, ManagedCamera>>>,
}

impl CameraManager {
    pub fn new() -> Self {
        Self {
            cameras: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Adds or replaces a camera. The host is validated before the record is accepted.
    pub async fn add_camera(&self, config: CameraConfig) -> CameraResult<()> {
        config.endpoint()?;
        config.parsed_stream_url()?;
        let camera_id = config.id.clone();

        let mut cameras = self.cameras.write().await;
        let op_lock = cameras
            .get(&camera_id)
            .map(|existing| Arc::clone(&existing.op_lock))
            .unwrap_or_default();
        cameras.insert(camera_id.clone(), ManagedCamera { config, op_lock });

        tracing::info!("Added camera: {}", camera_id);
        Ok(())
    }

    pub async fn remove_camera(&self, camera_id: &str) -> bool {
        let removed = self.cameras.write().await.remove(camera_id).is_some();
        if removed {
            tracing::info!("Removed camera: {}", camera_id);
        }
        removed
    }

    pub async fn get_camera(&self, camera_id: &str) -> Option<CameraConfig> {
        let cameras = self.cameras.read().await;
        cameras.get(camera_id).map(|c| c.config.clone())
    }

    pub async fn require(&self, camera_id: &str) -> CameraResult<CameraConfig> {
        self.get_camera(camera_id)
            .await
            .ok_or_else(|| CameraError::UnknownCamera(camera_id.to_string()))
    }

    pub async fn list(&self) -> Vec<CameraConfig> {
        let cameras = self.cameras.read().await;
        let mut list: Vec<_> = cameras.values().map(|c| c.config.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Exclusive access to one camera's endpoint for the lifetime of the guard.
    pub async fn lock(&self, camera_id: &str) -> CameraResult<OwnedMutexGuard<()>> {
        let op_lock = {
            let cameras = self.cameras.read().await;
            cameras
                .get(camera_id)
                .map(|c| Arc::clone(&c.op_lock))
                .ok_or_else(|| CameraError::UnknownCamera(camera_id.to_string()))?
        };
        Ok(op_lock.lock_owned().await)
    }
}

impl Clone for CameraManager {
    fn clone(&self) -> Self {
        Self {
            cameras: Arc::clone(&self.cameras),
        }
    }
}

impl Default for CameraManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_add_rejects_bad_host() {
        let manager = CameraManager::new();
        let bad = CameraConfig::new("x", "not a host", 80);
        assert!(matches!(manager.add_camera(bad).await, Err(CameraError::MalformedInput(_))));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_camera() {
        let manager = CameraManager::new();
        assert!(matches!(manager.require("nope").await, Err(CameraError::UnknownCamera(_))));
        assert!(manager.lock("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_lock_serialises_same_camera_only() {
        let manager = CameraManager::new();
        manager.add_camera(CameraConfig::new("a", "10.0.0.1", 80)).await.unwrap();
        manager.add_camera(CameraConfig::new("b", "10.0.0.2", 80)).await.unwrap();

        let guard = manager.lock("a").await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), manager.lock("a")).await;
        assert!(blocked.is_err());
        let other = tokio::time::timeout(Duration::from_millis(50), manager.lock("b")).await;
        assert!(other.is_ok());
        drop(guard);
        assert!(manager.lock("a").await.is_ok());
    }

    #[tokio::test]
    async fn test_replacing_keeps_lock() {
        let manager = CameraManager::new();
        manager.add_camera(CameraConfig::new("a", "10.0.0.1", 80)).await.unwrap();
        let _guard = manager.lock("a").await.unwrap();
        manager.add_camera(CameraConfig::new("a", "10.0.0.9", 80)).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), manager.lock("a")).await;
        assert!(blocked.is_err());
        assert_eq!(manager.get_camera("a").await.unwrap().host, "10.0.0.9");
    }
}
