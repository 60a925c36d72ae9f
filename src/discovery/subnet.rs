use futures::stream::{self, StreamExt};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::camera::types::ProtocolDetectionResult;
use crate::discovery::engine::DiscoveryEngine;
use crate::error::{CameraError, CameraResult};
use crate::knowledge::ScanScenario;

/// Ports checked before a host earns a full protocol scan.
const SWEEP_PORTS: &[u16] = &[554, 80, 8000, 37777, 8080, 2020];

/// The `/24` network containing `prefix`, or the local interface address.
pub fn sweep_hosts(prefix: Option<Ipv4Addr>) -> CameraResult<Vec<Ipv4Addr>> {
    let base = match prefix {
        Some(ip) => ip,
        None => match local_ip_address::local_ip() {
            Ok(IpAddr::V4(ip)) => ip,
            Ok(IpAddr::V6(ip)) => {
                return Err(CameraError::malformed(format!(
                    "local address {} is not IPv4; supply a prefix",
                    ip
                )))
            }
            Err(e) => {
                return Err(CameraError::malformed(format!(
                    "cannot determine local address: {}",
                    e
                )))
            }
        },
    };
    let [a, b, c, _] = base.octets();
    Ok((1..=254).map(|d| Ipv4Addr::new(a, b, c, d)).collect())
}

/// Sweeps a `/24`, running full discovery on every host that accepts a connection on
/// one of the sweep ports. At most `concurrency` hosts are probed at once; each host's
/// own probes stay sequential.
pub async fn sweep(
    engine: &DiscoveryEngine,
    prefix: Option<Ipv4Addr>,
    concurrency: usize,
) -> CameraResult<Vec<ProtocolDetectionResult>> {
    let hosts = sweep_hosts(prefix)?;
    let quick = engine.timeouts().for_scenario(ScanScenario::Fast);
    tracing::info!(
        "Sweeping {} hosts from {} (concurrency {})",
        hosts.len(),
        hosts.first().map(|h| h.to_string()).unwrap_or_default(),
        concurrency
    );

    let mut found: Vec<ProtocolDetectionResult> = stream::iter(hosts)
        .map(|ip| async move { scan_host(engine, ip, quick).await })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|r| async move { r })
        .collect()
        .await;

    found.sort_by_key(|r| r.host.parse::<Ipv4Addr>().ok());
    tracing::info!("Sweep found {} camera candidates", found.len());
    Ok(found)
}

async fn scan_host(
    engine: &DiscoveryEngine,
    ip: Ipv4Addr,
    quick: Duration,
) -> Option<ProtocolDetectionResult> {
    let host = ip.to_string();
    let mut alive = false;
    for port in SWEEP_PORTS {
        if engine.prober().probe_tcp(&host, *port, quick).await {
            alive = true;
            break;
        }
    }
    if !alive {
        return None;
    }
    match engine.discover_device(&host, None).await {
        Ok(result) if result.has_any_protocol() => Some(result),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Discovery of {} failed: {}", host, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::endpoint::Credentials;
    use crate::knowledge::ScanTimeouts;
    use crate::probe::{ProbeStatus, Prober};
    use async_trait::async_trait;
    use std::sync::Arc;
    use url::Url;

    struct OneCamera;

    #[async_trait]
    impl Prober for OneCamera {
        async fn probe_http(&self, _: &Url, _: Option<&Credentials>, _: bool, _: Duration) -> ProbeStatus {
            ProbeStatus::Unreachable
        }

        async fn probe_tcp(&self, host: &str, port: u16, _: Duration) -> bool {
            host == "10.1.2.30" && port == 554
        }

        async fn probe_onvif(&self, _: &Url, _: bool, _: Duration) -> ProbeStatus {
            ProbeStatus::Unreachable
        }
    }

    #[test]
    fn test_sweep_hosts_cover_the_24() {
        let hosts = sweep_hosts(Some(Ipv4Addr::new(192, 168, 7, 99))).unwrap();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 7, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 7, 254));
    }

    #[tokio::test]
    async fn test_sweep_reports_only_responders() {
        let engine = DiscoveryEngine::new(Arc::new(OneCamera), ScanTimeouts::default());
        let found = sweep(&engine, Some(Ipv4Addr::new(10, 1, 2, 0)), 32).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].host, "10.1.2.30");
        assert!(found[0].rtsp_available);
    }
}
