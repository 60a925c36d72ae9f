use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::camera::endpoint::Credentials;
use crate::camera::types::{ProtocolDetectionResult, RecordingDescriptor};
use crate::camera::CameraConfig;
use crate::probe::{HttpClients, Prober};

/// Timeouts and switches for one resolver instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    pub probe_timeout: Duration,
    pub rtsp_timeout: Duration,
    pub download_timeout: Duration,
    pub ftp_timeout: Duration,
    /// Offer the live RTSP stream when no recording URL could be validated.
    pub live_stream_fallback: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            rtsp_timeout: Duration::from_secs(2),
            download_timeout: Duration::from_secs(120),
            ftp_timeout: Duration::from_secs(10),
            live_stream_fallback: true,
        }
    }
}

/// Everything a playback or download strategy may look at.
#[derive(Clone)]
pub struct ResolveContext {
    pub camera: CameraConfig,
    pub recording: RecordingDescriptor,
    pub detection: Option<ProtocolDetectionResult>,
    pub prober: Arc<dyn Prober>,
    pub http: HttpClients,
    pub settings: ResolverSettings,
}

impl ResolveContext {
    pub fn credentials(&self) -> Option<Credentials> {
        self.camera.credentials()
    }

    /// Bases whose port accepts a TCP connection, in the given order. Every candidate
    /// built on a closed port would fail anyway.
    pub async fn open_bases(&self, bases: Vec<Url>) -> Vec<Url> {
        let mut open = Vec::with_capacity(bases.len());
        for base in bases {
            let (Some(host), Some(port)) = (base.host_str(), base.port_or_known_default()) else {
                continue;
            };
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if self
                .prober
                .probe_tcp(host, port, self.settings.probe_timeout)
                .await
            {
                open.push(base);
            } else {
                tracing::trace!("Skipping closed base {}", base);
            }
        }
        open
    }
}
