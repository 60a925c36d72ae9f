//! Per-camera operations exposed to the application layer.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::types::{
    CameraCapabilities, ProtocolDetectionResult, ProtocolKind, RecordingDescriptor, TimeRange,
};
use crate::camera::{CameraConfig, CameraManager, CapabilityCache};
use crate::discovery::{subnet, ws_discovery, DiscoveredDevice, DiscoveryEngine};
use crate::error::{CameraError, CameraResult, StrategyKind};
use crate::knowledge::ScanTimeouts;
use crate::onvif::OnvifNegotiator;
use crate::probe::{HttpClients, Prober};
use crate::ptz::{PtzCommand, PtzController, StreamQuality, StreamSelection, StreamSelector};
use crate::resolver::{DownloadReport, PlaybackUrl, RecordingResolver, ResolverSettings};
use crate::store::{PersistedState, StateStore};

/// Structured result of one top-level operation, for the notification layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation: &'static str,
    pub camera_id: Option<String>,
    pub success: bool,
    pub reason: Option<&'static str>,
}

pub trait OutcomeSink: Send + Sync {
    fn emit(&self, outcome: &OperationOutcome);
}

/// Writes outcomes to the log.
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn emit(&self, outcome: &OperationOutcome) {
        let camera = outcome.camera_id.as_deref().unwrap_or("-");
        if outcome.success {
            tracing::info!("{} [{}] ok", outcome.operation, camera);
        } else {
            tracing::warn!(
                "{} [{}] failed: {}",
                outcome.operation,
                camera,
                outcome.reason.unwrap_or("unknown")
            );
        }
    }
}

/// Entries created only to hold a Profile G verdict carry no services or profiles.
fn is_negotiated(capabilities: &CameraCapabilities) -> bool {
    capabilities.services.device.is_some()
        || capabilities.services.media.is_some()
        || !capabilities.available_profiles.is_empty()
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub resolver: ResolverSettings,
    pub scan_timeouts: ScanTimeouts,
    pub onvif_timeout: Duration,
    pub ptz_timeout: Duration,
    pub discovery_deadline: Duration,
    pub discovery_concurrency: usize,
    pub ws_discovery_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            resolver: ResolverSettings::default(),
            scan_timeouts: ScanTimeouts::default(),
            onvif_timeout: Duration::from_secs(5),
            ptz_timeout: Duration::from_secs(3),
            discovery_deadline: Duration::from_secs(90),
            discovery_concurrency: 32,
            ws_discovery_timeout: Duration::from_secs(3),
        }
    }
}

/// Ties the registry, cache and engines together. Every camera-scoped operation holds
/// that camera's lock for its whole duration.
#[derive(Clone)]
pub struct CameraService {
    cameras: CameraManager,
    cache: CapabilityCache,
    http: HttpClients,
    discovery: DiscoveryEngine,
    negotiator: OnvifNegotiator,
    resolver: RecordingResolver,
    ptz: PtzController,
    streams: StreamSelector,
    options: ServiceOptions,
    sink: Arc<dyn OutcomeSink>,
    store: Option<Arc<StateStore>>,
}

impl CameraService {
    pub fn new(
        cameras: CameraManager,
        cache: CapabilityCache,
        prober: Arc<dyn Prober>,
        http: HttpClients,
        options: ServiceOptions,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        let negotiator = OnvifNegotiator::new(http.clone(), options.onvif_timeout);
        Self {
            discovery: DiscoveryEngine::new(prober.clone(), options.scan_timeouts),
            resolver: RecordingResolver::new(
                prober.clone(),
                http.clone(),
                negotiator.clone(),
                cache.clone(),
                options.resolver,
            ),
            ptz: PtzController::new(negotiator.clone(), http.clone(), options.ptz_timeout),
            streams: StreamSelector::new(negotiator.clone(), prober),
            negotiator,
            cameras,
            cache,
            http,
            options,
            sink,
            store: None,
        }
    }

    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn cameras(&self) -> &CameraManager {
        &self.cameras
    }

    pub fn cache(&self) -> &CapabilityCache {
        &self.cache
    }

    fn report<T>(&self, operation: &'static str, camera_id: Option<&str>, result: &CameraResult<T>) {
        self.sink.emit(&OperationOutcome {
            operation,
            camera_id: camera_id.map(str::to_string),
            success: result.is_ok(),
            reason: result.as_ref().err().map(CameraError::code),
        });
    }

    /// Registers or replaces a camera. A replaced camera keeps its cache entry only when
    /// its host did not change.
    pub async fn add_camera(&self, config: CameraConfig) -> CameraResult<()> {
        let camera_id = config.id.clone();
        let previous = self.cameras.get_camera(&camera_id).await;
        let result = self.cameras.add_camera(config.clone()).await;
        if result.is_ok() && previous.map(|p| p.host != config.host).unwrap_or(false) {
            self.cache.invalidate(&camera_id).await;
        }
        self.report("add_camera", Some(&camera_id), &result);
        self.persist_if_ok(&result).await;
        result
    }

    pub async fn remove_camera(&self, camera_id: &str) -> bool {
        let removed = self.cameras.remove_camera(camera_id).await;
        if removed {
            self.cache.invalidate(camera_id).await;
            self.persist().await;
        }
        removed
    }

    /// Detection for an arbitrary host, outside the registry.
    pub async fn discover_device(
        &self,
        host: &str,
        manufacturer: Option<&str>,
    ) -> CameraResult<ProtocolDetectionResult> {
        let result = self
            .discovery
            .discover_device_within(host, manufacturer, self.options.discovery_deadline)
            .await;
        self.report("discover_device", None, &result);
        result
    }

    /// Cached detection for a registered camera, probing when absent or `force` is set.
    pub async fn detect_protocols(&self, camera_id: &str, force: bool) -> CameraResult<ProtocolDetectionResult> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            self.detection_for(&camera, force).await
        }
        .await;
        self.report("detect_protocols", Some(camera_id), &result);
        self.persist_if_ok(&result).await;
        result
    }

    pub async fn negotiate_capabilities(&self, camera_id: &str, force: bool) -> CameraResult<CameraCapabilities> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            if !force {
                if let Some(cached) = self.cache.capabilities(camera_id).await.filter(is_negotiated) {
                    return Ok(cached);
                }
            }
            let detection = self.cache.detection(camera_id).await;
            self.negotiate_for(&camera, detection.as_ref()).await
        }
        .await;
        self.report("negotiate_capabilities", Some(camera_id), &result);
        self.persist_if_ok(&result).await;
        result
    }

    pub async fn search_recordings(
        &self,
        camera_id: &str,
        range: TimeRange,
        recording_type: Option<&str>,
    ) -> CameraResult<Vec<RecordingDescriptor>> {
        let result = async {
            range.validate()?;
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            let detection = self.detection_for(&camera, false).await.ok();
            let capabilities = self.lazy_capabilities(&camera, detection.as_ref()).await?;
            self.resolver
                .search_recordings(&camera, detection, capabilities, range, recording_type)
                .await
        }
        .await;
        self.report("search_recordings", Some(camera_id), &result);
        // Detection and the Profile G verdict may have been cached even when the search
        // itself came back empty-handed.
        self.persist().await;
        result
    }

    pub async fn get_playback_url(
        &self,
        camera_id: &str,
        recording: &RecordingDescriptor,
    ) -> CameraResult<PlaybackUrl> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            let detection = self.cache.detection(camera_id).await;
            self.resolver.get_playback_url(&camera, recording, detection).await
        }
        .await;
        self.report("get_playback_url", Some(camera_id), &result);
        result
    }

    pub async fn download_recording(
        &self,
        camera_id: &str,
        recording: &RecordingDescriptor,
        destination: &Path,
    ) -> CameraResult<DownloadReport> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            let detection = self.cache.detection(camera_id).await;
            self.resolver
                .download_recording(&camera, recording, destination, detection)
                .await
        }
        .await;
        self.report("download_recording", Some(camera_id), &result);
        result
    }

    /// `Ok(false)` when the device refused or could not be reached. Only cached
    /// capabilities are consulted, so a camera never negotiated is rejected without
    /// network traffic unless it carries a PTZ override.
    pub async fn send_ptz_command(&self, camera_id: &str, command: &PtzCommand) -> CameraResult<bool> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let capabilities = self.cache.capabilities(camera_id).await;
            command.validate()?;
            let _guard = self.cameras.lock(camera_id).await?;
            self.ptz.send(&camera, capabilities.as_ref(), command).await
        }
        .await;
        self.sink.emit(&OperationOutcome {
            operation: "send_ptz_command",
            camera_id: Some(camera_id.to_string()),
            success: matches!(result, Ok(true)),
            reason: match &result {
                Ok(true) => None,
                Ok(false) => Some("device_rejected"),
                Err(e) => Some(e.code()),
            },
        });
        result
    }

    pub async fn select_stream(&self, camera_id: &str, quality: StreamQuality) -> CameraResult<StreamSelection> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            let detection = self.cache.detection(camera_id).await;
            let capabilities = self.lazy_capabilities(&camera, detection.as_ref()).await?;
            self.streams
                .select_stream(&camera, capabilities.as_ref(), detection.as_ref(), quality)
                .await
        }
        .await;
        self.report("select_stream", Some(camera_id), &result);
        self.persist_if_ok(&result).await;
        result
    }

    /// Drops everything cached for the camera and detects again. Capability
    /// negotiation follows when ONVIF answers; its failure does not fail the re-detection.
    pub async fn redetect(&self, camera_id: &str) -> CameraResult<ProtocolDetectionResult> {
        let result = async {
            let camera = self.cameras.require(camera_id).await?;
            let _guard = self.cameras.lock(camera_id).await?;
            self.cache.invalidate(camera_id).await;
            let detection = self.detection_for(&camera, true).await?;
            if detection.onvif_available {
                if let Err(e) = self.negotiate_for(&camera, Some(&detection)).await {
                    tracing::info!("Capability negotiation after re-detect of {} failed: {}", camera_id, e);
                }
            }
            Ok(detection)
        }
        .await;
        self.report("redetect", Some(camera_id), &result);
        self.persist_if_ok(&result).await;
        result
    }

    pub async fn set_accept_self_signed(&self, accept: bool) {
        self.http.tls().set_accept_self_signed(accept);
        self.persist().await;
    }

    pub fn accepts_self_signed(&self) -> bool {
        self.http.tls().accepts_self_signed()
    }

    /// ONVIF WS-Discovery on the local segment.
    pub async fn ws_discover(&self) -> CameraResult<Vec<DiscoveredDevice>> {
        let result = ws_discovery::probe(self.options.ws_discovery_timeout)
            .await
            .map_err(|e| {
                tracing::warn!("WS-Discovery failed: {:#}", e);
                CameraError::exhausted("ws_discover", vec![StrategyKind::OnvifProbe])
            });
        self.report("ws_discover", None, &result);
        result
    }

    pub async fn sweep_subnet(&self, prefix: Option<Ipv4Addr>) -> CameraResult<Vec<ProtocolDetectionResult>> {
        let result = subnet::sweep(&self.discovery, prefix, self.options.discovery_concurrency).await;
        self.report("sweep_subnet", None, &result);
        result
    }

    async fn detection_for(&self, camera: &CameraConfig, force: bool) -> CameraResult<ProtocolDetectionResult> {
        if !force {
            if let Some(cached) = self.cache.detection(&camera.id).await {
                return Ok(cached);
            }
        }
        let detection = self
            .discovery
            .discover_device_within(
                &camera.host,
                camera.manufacturer.as_deref(),
                self.options.discovery_deadline,
            )
            .await?;
        // A scan where nothing answered must not replace an earlier good detection.
        if detection.has_any_protocol() || self.cache.detection(&camera.id).await.is_none() {
            self.cache.store_detection(&camera.id, detection.clone()).await;
        }
        Ok(detection)
    }

    async fn negotiate_for(
        &self,
        camera: &CameraConfig,
        detection: Option<&ProtocolDetectionResult>,
    ) -> CameraResult<CameraCapabilities> {
        let mut endpoint = camera.endpoint()?;
        if let Some(port) = detection.and_then(|d| d.port(ProtocolKind::Onvif)) {
            endpoint = endpoint.on_port(port)?;
        }
        let mut capabilities = self.negotiator.negotiate(&endpoint).await?;
        // A Profile G verdict learned from a failed search outlives renegotiation.
        if let Some(previous) = self.cache.capabilities(&camera.id).await {
            if previous.supports_onvif_profile_g.is_no() {
                capabilities.supports_onvif_profile_g = previous.supports_onvif_profile_g;
                capabilities.has_recording_search = false;
            }
        }
        self.cache.store_capabilities(&camera.id, capabilities.clone()).await;
        Ok(capabilities)
    }

    /// Cached capabilities, negotiating once when ONVIF was detected. Only rejected
    /// credentials are an error; other negotiation failures leave the caller without
    /// capabilities.
    async fn lazy_capabilities(
        &self,
        camera: &CameraConfig,
        detection: Option<&ProtocolDetectionResult>,
    ) -> CameraResult<Option<CameraCapabilities>> {
        if let Some(cached) = self.cache.capabilities(&camera.id).await.filter(is_negotiated) {
            return Ok(Some(cached));
        }
        if !detection.map(|d| d.onvif_available).unwrap_or(false) {
            return Ok(None);
        }
        match self.negotiate_for(camera, detection).await {
            Ok(caps) => Ok(Some(caps)),
            Err(e @ CameraError::AuthenticationFailure { .. }) => Err(e),
            Err(e) => {
                tracing::debug!("Capability negotiation for {} failed: {}", camera.id, e);
                Ok(None)
            }
        }
    }

    async fn persist_if_ok<T>(&self, result: &CameraResult<T>) {
        if result.is_ok() {
            self.persist().await;
        }
    }

    /// Current registry, cache and TLS preference as one record.
    pub async fn state(&self) -> PersistedState {
        PersistedState {
            cameras: self.cameras.list().await,
            capability_cache: self.cache.snapshot().await,
            accept_self_signed_tls: self.accepts_self_signed(),
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.state().await).await {
            tracing::warn!("Failed to save state to {}: {:#}", store.path().display(), e);
        }
    }
}
