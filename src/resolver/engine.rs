use std::path::Path;
use std::sync::Arc;

use crate::camera::types::{CameraCapabilities, ProtocolDetectionResult, RecordingDescriptor, TimeRange};
use crate::camera::{CameraConfig, CapabilityCache};
use crate::error::{CameraError, CameraResult};
use crate::onvif::OnvifNegotiator;
use crate::probe::{HttpClients, Prober};
use crate::resolver::context::{ResolveContext, ResolverSettings};
use crate::resolver::download::{download_strategies, DownloadJob, DownloadReport};
use crate::resolver::playback::{playback_strategies, PlaybackUrl};
use crate::resolver::search::{search_strategies, SearchJob};
use crate::resolver::strategy::{resolve, resolve_or_default};

/// Recording search, playback URL resolution and download for one camera at a time.
///
/// Strategies always run sequentially in their fixed order, so at most one connection
/// is open against the device at any moment.
#[derive(Clone)]
pub struct RecordingResolver {
    prober: Arc<dyn Prober>,
    http: HttpClients,
    negotiator: OnvifNegotiator,
    cache: CapabilityCache,
    settings: ResolverSettings,
}

impl RecordingResolver {
    pub fn new(
        prober: Arc<dyn Prober>,
        http: HttpClients,
        negotiator: OnvifNegotiator,
        cache: CapabilityCache,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            prober,
            http,
            negotiator,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    fn context(
        &self,
        camera: &CameraConfig,
        recording: RecordingDescriptor,
        detection: Option<ProtocolDetectionResult>,
    ) -> CameraResult<ResolveContext> {
        // Fail fast on caller input before any strategy runs.
        camera.endpoint()?;
        camera.parsed_stream_url()?;
        Ok(ResolveContext {
            camera: camera.clone(),
            recording,
            detection,
            prober: self.prober.clone(),
            http: self.http.clone(),
            settings: self.settings,
        })
    }

    /// Recordings in device order. Empty when the device answered but holds nothing
    /// matching.
    pub async fn search_recordings(
        &self,
        camera: &CameraConfig,
        detection: Option<ProtocolDetectionResult>,
        capabilities: Option<CameraCapabilities>,
        range: TimeRange,
        recording_type: Option<&str>,
    ) -> CameraResult<Vec<RecordingDescriptor>> {
        range.validate()?;
        let job = SearchJob {
            ctx: self.context(camera, RecordingDescriptor::default(), detection)?,
            range,
            recording_type: recording_type.map(str::to_string),
            negotiator: self.negotiator.clone(),
            cache: self.cache.clone(),
            capabilities,
        };
        resolve_or_default("search_recordings", &search_strategies(), &job).await
    }

    pub async fn get_playback_url(
        &self,
        camera: &CameraConfig,
        recording: &RecordingDescriptor,
        detection: Option<ProtocolDetectionResult>,
    ) -> CameraResult<PlaybackUrl> {
        let ctx = self.context(camera, recording.clone(), detection)?;
        resolve("get_playback_url", &playback_strategies(), &ctx).await
    }

    /// Downloads into `destination`. The file only appears there once a transfer has
    /// completed with data.
    pub async fn download_recording(
        &self,
        camera: &CameraConfig,
        recording: &RecordingDescriptor,
        destination: &Path,
        detection: Option<ProtocolDetectionResult>,
    ) -> CameraResult<DownloadReport> {
        if destination.as_os_str().is_empty() || destination.is_dir() {
            return Err(CameraError::malformed(format!(
                "invalid destination {}",
                destination.display()
            )));
        }
        let job = DownloadJob {
            ctx: self.context(camera, recording.clone(), detection)?,
            destination: destination.to_path_buf(),
        };
        resolve("download_recording", &download_strategies(), &job).await
    }
}
