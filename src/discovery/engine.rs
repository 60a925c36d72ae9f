use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::camera::endpoint::{normalize_host, url_host};
use crate::camera::types::{CandidateProbe, ProbeState, ProtocolDetectionResult, ProtocolKind};
use crate::error::{CameraError, CameraResult, StrategyKind};
use crate::knowledge::ports::{port_score, priority_threshold};
use crate::knowledge::{dynamic_priority_ports, manufacturer_ports, PortWeights, ScanScenario, ScanTimeouts};
use crate::probe::Prober;

/// Port-scan based protocol detection for a single host.
#[derive(Clone)]
pub struct DiscoveryEngine {
    prober: Arc<dyn Prober>,
    timeouts: ScanTimeouts,
    weights: PortWeights,
}

const CATEGORIES: [ProtocolKind; 4] = [
    ProtocolKind::Onvif,
    ProtocolKind::Http,
    ProtocolKind::Proprietary,
    ProtocolKind::Rtsp,
];

fn strategy_for(kind: ProtocolKind) -> StrategyKind {
    match kind {
        ProtocolKind::Onvif => StrategyKind::OnvifProbe,
        ProtocolKind::Http => StrategyKind::HttpProbe,
        ProtocolKind::Proprietary => StrategyKind::ProprietaryProbe,
        ProtocolKind::Rtsp => StrategyKind::RtspProbe,
    }
}

impl DiscoveryEngine {
    pub fn new(prober: Arc<dyn Prober>, timeouts: ScanTimeouts) -> Self {
        Self {
            prober,
            timeouts,
            weights: PortWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: PortWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    pub fn timeouts(&self) -> &ScanTimeouts {
        &self.timeouts
    }

    fn timeout_for(&self, kind: ProtocolKind, port: u16) -> Duration {
        let scenario = if kind == ProtocolKind::Rtsp {
            ScanScenario::Rtsp
        } else if port_score(port, &self.weights) >= priority_threshold(&self.weights) {
            ScanScenario::Fast
        } else {
            ScanScenario::Common
        };
        self.timeouts.for_scenario(scenario)
    }

    async fn probe_candidate(&self, host: &str, kind: ProtocolKind, port: u16) -> bool {
        let timeout = self.timeout_for(kind, port);
        let scheme = if port == 443 || port == 8443 { "https" } else { "http" };
        match kind {
            ProtocolKind::Onvif => {
                let raw = format!("{}://{}:{}/onvif/device_service", scheme, url_host(host), port);
                match Url::parse(&raw) {
                    Ok(url) => self.prober.probe_onvif(&url, false, timeout).await.is_present(),
                    Err(_) => false,
                }
            }
            ProtocolKind::Http => {
                let raw = format!("{}://{}:{}/", scheme, url_host(host), port);
                match Url::parse(&raw) {
                    Ok(url) => self.prober.probe_http(&url, None, false, timeout).await.is_present(),
                    Err(_) => false,
                }
            }
            ProtocolKind::Proprietary => self.prober.probe_tcp(host, port, timeout).await,
            ProtocolKind::Rtsp => self.prober.probe_rtsp_port(host, port, timeout).await,
        }
    }

    /// Probes each protocol category in scored port order, stopping a category at its
    /// first responding port. A host where nothing answers yields an all-false result
    /// with `error` set, never an `Err`.
    pub async fn discover_device(
        &self,
        host: &str,
        manufacturer: Option<&str>,
    ) -> CameraResult<ProtocolDetectionResult> {
        let mut reached = Vec::new();
        self.scan(host, manufacturer, &mut reached).await
    }

    /// Pushes each category onto `reached` as its probing starts.
    async fn scan(
        &self,
        host: &str,
        manufacturer: Option<&str>,
        reached: &mut Vec<ProtocolKind>,
    ) -> CameraResult<ProtocolDetectionResult> {
        let host = normalize_host(host)?;
        let table = manufacturer_ports(manufacturer).merged_with_generic();
        tracing::info!("Discovering protocols on {} (manufacturer: {:?})", host, manufacturer);

        let mut probes = Vec::new();
        let mut detected_ports = BTreeMap::new();

        for kind in CATEGORIES {
            reached.push(kind);
            let list = match kind {
                ProtocolKind::Onvif => &table.onvif,
                ProtocolKind::Http => &table.http,
                ProtocolKind::Proprietary => &table.proprietary,
                ProtocolKind::Rtsp => &table.rtsp,
            };
            let ordered = dynamic_priority_ports(list, &self.weights);
            let start = probes.len();
            probes.extend(ordered.iter().map(|&port| CandidateProbe {
                protocol: kind,
                port,
                state: ProbeState::Unprobed,
            }));

            for (offset, port) in ordered.iter().copied().enumerate() {
                let slot = start + offset;
                probes[slot].state = ProbeState::Probing;
                if self.probe_candidate(&host, kind, port).await {
                    tracing::debug!("{}:{} answers {:?}", host, port, kind);
                    probes[slot].state = ProbeState::Reachable(kind);
                    detected_ports.insert(kind, port);
                    break;
                }
                tracing::trace!("{}:{} not {:?}", host, port, kind);
                probes[slot].state = ProbeState::Unreachable;
            }
        }

        let onvif_available = detected_ports.contains_key(&ProtocolKind::Onvif);
        let proprietary_available = detected_ports.contains_key(&ProtocolKind::Http)
            || detected_ports.contains_key(&ProtocolKind::Proprietary);
        let rtsp_available = detected_ports.contains_key(&ProtocolKind::Rtsp);

        let mut result = ProtocolDetectionResult {
            host: host.clone(),
            onvif_available,
            proprietary_available,
            rtsp_available,
            detected_ports,
            error: None,
            detected_at: Utc::now(),
            probes,
        };
        if !result.has_any_protocol() {
            tracing::warn!("No supported protocol responded on {}", host);
            result.error = Some(format!("no supported protocol responded on {}", host));
        } else {
            tracing::info!(
                "{}: onvif={} proprietary={} rtsp={} ports={:?}",
                host,
                result.onvif_available,
                result.proprietary_available,
                result.rtsp_available,
                result.detected_ports
            );
        }
        Ok(result)
    }

    /// [`DiscoveryEngine::discover_device`] bounded by a caller deadline. Dropping the
    /// scan closes any socket it had open. On expiry the error lists the categories the
    /// scan had started.
    pub async fn discover_device_within(
        &self,
        host: &str,
        manufacturer: Option<&str>,
        deadline: Duration,
    ) -> CameraResult<ProtocolDetectionResult> {
        let mut reached = Vec::new();
        let outcome =
            tokio::time::timeout(deadline, self.scan(host, manufacturer, &mut reached)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Discovery of {} cancelled after {:?} during {:?}",
                    host,
                    deadline,
                    reached.last()
                );
                Err(CameraError::exhausted(
                    "discover_device",
                    reached.into_iter().map(strategy_for).collect(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::endpoint::Credentials;
    use crate::probe::ProbeStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProber {
        onvif_ports: Vec<u16>,
        http_ports: Vec<u16>,
        tcp_ports: Vec<u16>,
        /// Hangs every TCP connect for this long.
        tcp_delay: Option<Duration>,
        calls: Mutex<Vec<(ProtocolKind, u16)>>,
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe_http(&self, url: &Url, _: Option<&Credentials>, _: bool, _: Duration) -> ProbeStatus {
            let port = url.port_or_known_default().unwrap_or(0);
            self.calls.lock().unwrap().push((ProtocolKind::Http, port));
            if self.http_ports.contains(&port) {
                ProbeStatus::Reachable
            } else {
                ProbeStatus::Unreachable
            }
        }

        async fn probe_tcp(&self, _: &str, port: u16, _: Duration) -> bool {
            self.calls.lock().unwrap().push((ProtocolKind::Proprietary, port));
            if let Some(delay) = self.tcp_delay {
                tokio::time::sleep(delay).await;
            }
            self.tcp_ports.contains(&port)
        }

        async fn probe_onvif(&self, url: &Url, _: bool, _: Duration) -> ProbeStatus {
            let port = url.port_or_known_default().unwrap_or(0);
            self.calls.lock().unwrap().push((ProtocolKind::Onvif, port));
            if self.onvif_ports.contains(&port) {
                ProbeStatus::Denied
            } else {
                ProbeStatus::Unreachable
            }
        }
    }

    fn engine(prober: FakeProber) -> (DiscoveryEngine, Arc<FakeProber>) {
        let prober = Arc::new(prober);
        (DiscoveryEngine::new(prober.clone(), ScanTimeouts::default()), prober)
    }

    #[tokio::test]
    async fn test_category_stops_at_first_success() {
        let (engine, prober) = engine(FakeProber {
            onvif_ports: vec![2020, 8080],
            tcp_ports: vec![554, 8554],
            ..Default::default()
        });
        let result = engine.discover_device("192.168.1.50", None).await.unwrap();
        assert!(result.onvif_available);
        assert!(result.rtsp_available);
        assert!(!result.proprietary_available);
        // 2020 outscores 8080 (ONVIF > generic web).
        assert_eq!(result.port(ProtocolKind::Onvif), Some(2020));
        assert_eq!(result.port(ProtocolKind::Rtsp), Some(554));

        let calls = prober.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| c.0 == ProtocolKind::Onvif && c.1 == 8080).count(), 0);

        let rtsp: Vec<_> = result.probes.iter().filter(|p| p.protocol == ProtocolKind::Rtsp).collect();
        assert_eq!(rtsp[0].state, ProbeState::Reachable(ProtocolKind::Rtsp));
        assert!(rtsp[1..].iter().all(|p| p.state == ProbeState::Unprobed));
    }

    #[tokio::test]
    async fn test_http_answer_counts_as_proprietary() {
        let (engine, _) = engine(FakeProber {
            http_ports: vec![80],
            ..Default::default()
        });
        let result = engine.discover_device("10.0.0.7", Some("Dahua")).await.unwrap();
        assert!(result.proprietary_available);
        assert_eq!(result.port(ProtocolKind::Http), Some(80));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_silent_host_is_valid_all_false() {
        let (engine, _) = engine(FakeProber::default());
        let result = engine.discover_device("10.0.0.8", None).await.unwrap();
        assert!(!result.has_any_protocol());
        assert!(result.error.is_some());
        assert!(result.probes.iter().all(|p| p.state == ProbeState::Unreachable));
    }

    #[tokio::test]
    async fn test_malformed_host_fails_fast() {
        let (engine, prober) = engine(FakeProber::default());
        assert!(matches!(
            engine.discover_device("bad host!", None).await,
            Err(CameraError::MalformedInput(_))
        ));
        assert!(prober.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_reports_categories_reached() {
        let (engine, _) = engine(FakeProber {
            tcp_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let err = engine
            .discover_device_within("10.0.0.9", None, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            CameraError::ExhaustedStrategies { operation, attempted } => {
                assert_eq!(operation, "discover_device");
                assert_eq!(
                    attempted,
                    vec![
                        StrategyKind::OnvifProbe,
                        StrategyKind::HttpProbe,
                        StrategyKind::ProprietaryProbe,
                    ]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
