use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::camera::endpoint::url_host;
use crate::camera::types::{CameraCapabilities, ProtocolDetectionResult, ProtocolKind, StreamProfile};
use crate::camera::CameraConfig;
use crate::error::{CameraError, CameraResult, StrategyKind};
use crate::knowledge::paths::rtsp_templates_for;
use crate::knowledge::player_retry_timeout;
use crate::onvif::media::MediaService;
use crate::onvif::OnvifNegotiator;
use crate::probe::{redact, Prober};
use crate::resolver::candidates::{dedup, embed_credentials};

const DEFAULT_RTSP_PORT: u16 = 554;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamQuality {
    Main,
    /// Lower resolution substream.
    #[default]
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    Onvif,
    Template,
}

/// A live stream URL for an external player. Credentials are embedded in `url`;
/// `alternatives` are further candidates on the same validated port, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSelection {
    pub url: String,
    pub source: StreamSource,
    pub profile_token: Option<String>,
    pub alternatives: Vec<String>,
}

/// Profile for the wanted quality: the most pixels for main, the fewest for sub.
pub fn pick_profile(profiles: &[StreamProfile], quality: StreamQuality) -> Option<&StreamProfile> {
    match quality {
        StreamQuality::Main => profiles.iter().max_by_key(|p| p.pixels()),
        StreamQuality::Sub => profiles.iter().min_by_key(|p| p.pixels()),
    }
}

/// Template candidates grouped by port: the declared stream URL first, then the knowledge
/// base paths on the detected RTSP port.
pub fn template_candidates(
    camera: &CameraConfig,
    detection: Option<&ProtocolDetectionResult>,
    quality: StreamQuality,
) -> CameraResult<Vec<Url>> {
    let declared = camera
        .parsed_stream_url()?
        .filter(|u| u.scheme().eq_ignore_ascii_case("rtsp"));
    let port = detection
        .and_then(|d| d.port(ProtocolKind::Rtsp))
        .or_else(|| declared.as_ref().and_then(|u| u.port()))
        .unwrap_or(DEFAULT_RTSP_PORT);

    let mut candidates: Vec<Url> = declared.into_iter().collect();
    for path in rtsp_templates_for(quality == StreamQuality::Main) {
        let raw = format!("rtsp://{}:{}{}", url_host(&camera.host), port, path);
        if let Ok(url) = Url::parse(&raw) {
            candidates.push(url);
        }
    }
    Ok(dedup(candidates))
}

/// Live stream selection for the player.
#[derive(Clone)]
pub struct StreamSelector {
    negotiator: OnvifNegotiator,
    prober: Arc<dyn Prober>,
    max_attempts: u32,
}

impl StreamSelector {
    pub fn new(negotiator: OnvifNegotiator, prober: Arc<dyn Prober>) -> Self {
        Self {
            negotiator,
            prober,
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub async fn select_stream(
        &self,
        camera: &CameraConfig,
        capabilities: Option<&CameraCapabilities>,
        detection: Option<&ProtocolDetectionResult>,
        quality: StreamQuality,
    ) -> CameraResult<StreamSelection> {
        let credentials = camera.credentials();

        if let Some(selection) = self.from_onvif(camera, capabilities, quality).await? {
            return Ok(selection);
        }

        let candidates = template_candidates(camera, detection, quality)?;
        let mut attempted = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let (Some(host), Some(port)) = (candidate.host_str(), candidate.port_or_known_default()) else {
                continue;
            };
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if attempted.contains(&(host.to_string(), port)) {
                continue;
            }
            attempted.push((host.to_string(), port));

            for attempt in 0..self.max_attempts {
                let timeout = player_retry_timeout(attempt);
                if self.prober.probe_rtsp_port(host, port, timeout).await {
                    tracing::info!("Selected stream {} for {}", redact(candidate), camera.id);
                    let alternatives = candidates[index + 1..]
                        .iter()
                        .filter(|u| u.port_or_known_default() == Some(port))
                        .map(|u| embed_credentials(u, credentials.as_ref()).to_string())
                        .collect();
                    return Ok(StreamSelection {
                        url: embed_credentials(candidate, credentials.as_ref()).to_string(),
                        source: StreamSource::Template,
                        profile_token: None,
                        alternatives,
                    });
                }
                tracing::debug!(
                    "RTSP {}:{} not ready after {:?} (attempt {})",
                    host,
                    port,
                    timeout,
                    attempt + 1
                );
            }
        }

        tracing::warn!("No live stream found for {}", camera.id);
        Err(CameraError::exhausted("select_stream", vec![StrategyKind::RtspProbe]))
    }

    async fn from_onvif(
        &self,
        camera: &CameraConfig,
        capabilities: Option<&CameraCapabilities>,
        quality: StreamQuality,
    ) -> CameraResult<Option<StreamSelection>> {
        let Some(caps) = capabilities else {
            return Ok(None);
        };
        let (Some(media_url), Some(profile)) = (
            caps.services.media.as_deref(),
            pick_profile(&caps.available_profiles, quality),
        ) else {
            return Ok(None);
        };

        let client = self.negotiator.connect(&camera.endpoint()?).await;
        match MediaService::get_stream_uri(&client, media_url, &profile.token, "RTSP").await {
            Ok(stream) => match Url::parse(&stream.uri) {
                Ok(url) => Ok(Some(StreamSelection {
                    url: embed_credentials(&url, camera.credentials().as_ref()).to_string(),
                    source: StreamSource::Onvif,
                    profile_token: Some(profile.token.clone()),
                    alternatives: Vec::new(),
                })),
                Err(e) => {
                    tracing::debug!("GetStreamUri returned unusable uri: {}", e);
                    Ok(None)
                }
            },
            Err(e) if e.is_auth() => Err(CameraError::auth(media_url)),
            Err(e) => {
                tracing::debug!("GetStreamUri on {} failed: {}", camera.id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::endpoint::Credentials;
    use crate::probe::{HttpClients, ProbeStatus, TlsPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SlowRtsp {
        ready_on_attempt: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Prober for SlowRtsp {
        async fn probe_http(&self, _: &Url, _: Option<&Credentials>, _: bool, _: Duration) -> ProbeStatus {
            ProbeStatus::Unreachable
        }

        async fn probe_tcp(&self, _: &str, port: u16, _: Duration) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            port == 554 && n + 1 >= self.ready_on_attempt
        }

        async fn probe_onvif(&self, _: &Url, _: bool, _: Duration) -> ProbeStatus {
            ProbeStatus::Unreachable
        }
    }

    fn selector(prober: Arc<dyn Prober>) -> StreamSelector {
        let http = HttpClients::new(TlsPolicy::default()).unwrap();
        StreamSelector::new(OnvifNegotiator::new(http, Duration::from_secs(1)), prober)
    }

    fn profile(token: &str, w: u32, h: u32) -> StreamProfile {
        StreamProfile {
            token: token.to_string(),
            name: token.to_string(),
            encoding: Some("H264".to_string()),
            width: Some(w),
            height: Some(h),
            has_audio: false,
            has_ptz: false,
        }
    }

    #[test]
    fn test_pick_profile_by_resolution() {
        let profiles = vec![profile("sub", 640, 360), profile("main", 2560, 1440), profile("mid", 1280, 720)];
        assert_eq!(pick_profile(&profiles, StreamQuality::Main).unwrap().token, "main");
        assert_eq!(pick_profile(&profiles, StreamQuality::Sub).unwrap().token, "sub");
        assert!(pick_profile(&[], StreamQuality::Main).is_none());
    }

    #[test]
    fn test_declared_url_leads_candidates() {
        let mut camera = CameraConfig::new("cam", "192.168.1.50", 80);
        camera.stream_url = Some("rtsp://192.168.1.50:10554/live".to_string());
        let candidates = template_candidates(&camera, None, StreamQuality::Sub).unwrap();
        assert_eq!(candidates[0].as_str(), "rtsp://192.168.1.50:10554/live");
        assert_eq!(candidates[1].port(), Some(10554));
    }

    #[tokio::test]
    async fn test_retries_with_escalating_timeouts() {
        let prober = Arc::new(SlowRtsp {
            ready_on_attempt: 2,
            calls: AtomicU32::new(0),
        });
        let mut camera = CameraConfig::new("cam", "192.168.1.50", 80);
        camera.username = Some("admin".to_string());
        camera.password = Some("pw".to_string());

        let selection = selector(prober.clone())
            .select_stream(&camera, None, None, StreamQuality::Main)
            .await
            .unwrap();
        assert_eq!(selection.source, StreamSource::Template);
        assert_eq!(
            selection.url,
            "rtsp://admin:pw@192.168.1.50:554/cam/realmonitor?channel=1&subtype=0"
        );
        assert_eq!(selection.alternatives.len(), 17);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_port_answers() {
        let prober = Arc::new(SlowRtsp {
            ready_on_attempt: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let camera = CameraConfig::new("cam", "192.168.1.50", 80);
        let err = selector(prober)
            .with_max_attempts(1)
            .select_stream(&camera, None, None, StreamQuality::Sub)
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::ExhaustedStrategies { operation: "select_stream", .. }));
    }
}
