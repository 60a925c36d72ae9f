use std::time::Duration;

use crate::camera::endpoint::CameraEndpoint;
use crate::camera::types::{CameraCapabilities, OnvifServiceMap, RecordingDescriptor, Tristate};
use crate::camera::CameraClient;
use crate::error::{CameraError, CameraResult, StrategyKind};
use crate::onvif::device::{merge_services, DeviceService};
use crate::onvif::events::EventsService;
use crate::onvif::media::MediaService;
use crate::onvif::recording::RecordingService;
use crate::onvif::soap::SoapError;
use crate::probe::HttpClients;

/// Capability negotiation and recording queries against one ONVIF device at a time.
#[derive(Clone)]
pub struct OnvifNegotiator {
    http: HttpClients,
    timeout: Duration,
}

impl OnvifNegotiator {
    pub fn new(http: HttpClients, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Client with WS-Security timestamps aligned to the device clock when it reports one.
    pub async fn connect(&self, endpoint: &CameraEndpoint) -> CameraClient {
        let mut camera = CameraClient::new(endpoint.clone(), self.http.clone(), self.timeout);
        if camera.has_credentials() {
            match DeviceService::get_system_date_and_time(&camera).await {
                Ok(device_now) => camera.set_device_time(device_now),
                Err(e) => tracing::debug!("GetSystemDateAndTime on {} failed: {}", endpoint.host(), e),
            }
        }
        camera
    }

    pub async fn negotiate(&self, endpoint: &CameraEndpoint) -> CameraResult<CameraCapabilities> {
        let camera = self.connect(endpoint).await;
        let target = camera.device_service_url();

        let capabilities = DeviceService::get_capabilities(&camera).await;
        let services = DeviceService::get_services(&camera).await;

        for result in [capabilities.as_ref().err(), services.as_ref().err()].into_iter().flatten() {
            if result.is_auth() {
                return Err(CameraError::auth(target));
            }
        }
        if capabilities.is_err() && services.is_err() {
            tracing::warn!("{} answered neither GetCapabilities nor GetServices", target);
            return Err(CameraError::exhausted(
                "negotiate_capabilities",
                vec![StrategyKind::OnvifProbe],
            ));
        }

        let mut map = capabilities.unwrap_or_default();
        if let Ok(entries) = &services {
            merge_services(&mut map, entries);
        }

        let info = DeviceService::get_device_information(&camera).await.ok();

        let profiles = match &map.media {
            Some(url) => MediaService::get_profiles(&camera, url)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!("GetProfiles failed: {}", e);
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let has_motion_detection = match &map.events {
            Some(url) => EventsService::get_event_properties(&camera, url)
                .await
                .map(|p| p.has_motion_detection())
                .unwrap_or(false),
            None => false,
        };

        let caps = CameraCapabilities {
            has_ptz: map.ptz.is_some() || profiles.iter().any(|p| p.has_ptz),
            has_audio: profiles.iter().any(|p| p.has_audio),
            has_motion_detection,
            has_recording: map.recording.is_some() || map.search.is_some(),
            has_recording_search: map.search.is_some(),
            has_recording_download: map.replay.is_some(),
            supports_onvif_profile_g: Tristate::from_bool(map.search.is_some()),
            available_profiles: profiles,
            manufacturer: info.as_ref().map(|i| i.manufacturer.clone()).filter(|m| !m.is_empty()),
            model: info.as_ref().map(|i| i.model.clone()).filter(|m| !m.is_empty()),
            firmware_version: info
                .as_ref()
                .map(|i| i.firmware_version.clone())
                .filter(|m| !m.is_empty()),
            services: map,
        };

        tracing::info!(
            "Negotiated {}: ptz={} audio={} motion={} profile_g={:?} profiles={}",
            endpoint.host(),
            caps.has_ptz,
            caps.has_audio,
            caps.has_motion_detection,
            caps.supports_onvif_profile_g,
            caps.available_profiles.len()
        );
        Ok(caps)
    }

    /// Profile G `FindRecordings` session on the search service.
    pub async fn search_profile_g(
        &self,
        endpoint: &CameraEndpoint,
        services: &OnvifServiceMap,
    ) -> Result<Vec<RecordingDescriptor>, SoapError> {
        let search_url = services.search.as_deref().ok_or_else(no_such_service)?;
        let camera = self.connect(endpoint).await;
        let mut recordings = RecordingService::search_all(&camera, search_url).await?;
        self.attach_replay_uris(&camera, services, &mut recordings).await;
        Ok(recordings)
    }

    /// `GetRecordings` on the recording service, for devices without a search service.
    pub async fn list_recording_service(
        &self,
        endpoint: &CameraEndpoint,
        services: &OnvifServiceMap,
    ) -> Result<Vec<RecordingDescriptor>, SoapError> {
        let recording_url = services.recording.as_deref().ok_or_else(no_such_service)?;
        let camera = self.connect(endpoint).await;
        let mut recordings = RecordingService::get_recordings(&camera, recording_url).await?;
        self.attach_replay_uris(&camera, services, &mut recordings).await;
        Ok(recordings)
    }

    async fn attach_replay_uris(
        &self,
        camera: &CameraClient,
        services: &OnvifServiceMap,
        recordings: &mut [RecordingDescriptor],
    ) {
        let Some(replay_url) = services.replay.as_deref() else {
            return;
        };
        for rec in recordings.iter_mut() {
            match RecordingService::get_replay_uri(camera, replay_url, &rec.id).await {
                Ok(uri) => {
                    rec.metadata.insert("replayUri".to_string(), uri);
                }
                Err(e) => tracing::debug!("GetReplayUri {} failed: {}", rec.id, e),
            }
        }
    }
}

fn no_such_service() -> SoapError {
    SoapError::Fault(crate::onvif::soap::SoapFault {
        code: "Receiver".to_string(),
        subcode: Some("NoSuchService".to_string()),
        reason: "service not advertised by device".to_string(),
    })
}
