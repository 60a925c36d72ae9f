use reqwest::StatusCode;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use crate::camera::endpoint::{url_host, Credentials};
use crate::camera::types::CameraCapabilities;
use crate::camera::CameraConfig;
use crate::error::{CameraError, CameraResult};
use crate::onvif::OnvifNegotiator;
use crate::probe::HttpClients;
use crate::ptz::backends::{self, BackendTarget, WireRequest};
use crate::ptz::command::{PtzBackendKind, PtzCommand, PtzStep};

/// Resolved PTZ wiring for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct PtzRoute {
    pub target: BackendTarget,
    pub credentials: Option<Credentials>,
}

fn backend_for_manufacturer(manufacturer: &str) -> Option<PtzBackendKind> {
    let m = manufacturer.to_ascii_lowercase();
    if m.contains("dahua") || m.contains("amcrest") || m.contains("lorex") {
        Some(PtzBackendKind::Dahua)
    } else if m.contains("hikvision") || m.contains("hikvison") {
        Some(PtzBackendKind::Hikvision)
    } else if m.contains("reolink") {
        Some(PtzBackendKind::Reolink)
    } else {
        None
    }
}

fn base_url(host: &str, port: u16) -> String {
    let scheme = match port {
        443 | 8443 => "https",
        _ => "http",
    };
    format!("{}://{}:{}", scheme, url_host(host), port)
}

fn ptz_profile_token(capabilities: Option<&CameraCapabilities>) -> Option<String> {
    let profiles = &capabilities?.available_profiles;
    profiles
        .iter()
        .find(|p| p.has_ptz)
        .or_else(|| profiles.first())
        .map(|p| p.token.clone())
}

/// Picks the backend for a camera: an explicit override wins, then detected ONVIF PTZ,
/// then the manufacturer's CGI dialect when PTZ was detected without an ONVIF service.
pub fn route(camera: &CameraConfig, capabilities: Option<&CameraCapabilities>) -> CameraResult<PtzRoute> {
    let onvif_ptz_url = capabilities.and_then(|c| c.services.ptz.clone());
    let profile_token = ptz_profile_token(capabilities);
    let http_port = camera.http_port.unwrap_or(camera.port);

    if let Some(o) = &camera.ptz_override {
        let port = match (o.backend, o.port) {
            (_, Some(port)) => port,
            (PtzBackendKind::PelcoD, None) => {
                return Err(CameraError::CapabilityMissing("pelco-d bridge port"))
            }
            (_, None) => http_port,
        };
        let credentials = match &o.username {
            Some(user) if !user.is_empty() => Some(Credentials::new(
                user.clone(),
                o.password.clone().unwrap_or_default(),
            )),
            _ => camera.credentials(),
        };
        let onvif_ptz_url = onvif_ptz_url
            .or_else(|| Some(format!("{}/onvif/device_service", base_url(&camera.host, port))));
        return Ok(PtzRoute {
            target: BackendTarget {
                kind: o.backend,
                base_url: base_url(&camera.host, port),
                host: camera.host.clone(),
                port,
                channel: o.channel,
                pelco_address: o.pelco_address,
                onvif_ptz_url,
                profile_token,
            },
            credentials,
        });
    }

    let detected = capabilities.map(|c| c.has_ptz).unwrap_or(false);
    if !detected {
        return Err(CameraError::CapabilityMissing("ptz"));
    }
    let kind = if onvif_ptz_url.is_some() {
        PtzBackendKind::Onvif
    } else {
        camera
            .manufacturer
            .as_deref()
            .or_else(|| capabilities.and_then(|c| c.manufacturer.as_deref()))
            .and_then(backend_for_manufacturer)
            .ok_or(CameraError::CapabilityMissing("ptz"))?
    };
    let port = if kind == PtzBackendKind::Onvif { camera.port } else { http_port };
    Ok(PtzRoute {
        target: BackendTarget {
            kind,
            base_url: base_url(&camera.host, port),
            host: camera.host.clone(),
            port,
            channel: 1,
            pelco_address: 1,
            onvif_ptz_url,
            profile_token,
        },
        credentials: camera.credentials(),
    })
}

/// Result of pushing one request to the device.
enum Delivery {
    Accepted,
    Rejected(String),
}

/// Dispatches validated PTZ commands. A device that refuses or cannot be reached yields
/// `Ok(false)`; rejected credentials and local validation failures are errors.
#[derive(Clone)]
pub struct PtzController {
    negotiator: OnvifNegotiator,
    http: HttpClients,
    timeout: Duration,
}

impl PtzController {
    pub fn new(negotiator: OnvifNegotiator, http: HttpClients, timeout: Duration) -> Self {
        Self {
            negotiator,
            http,
            timeout,
        }
    }

    pub async fn send(
        &self,
        camera: &CameraConfig,
        capabilities: Option<&CameraCapabilities>,
        command: &PtzCommand,
    ) -> CameraResult<bool> {
        command.validate()?;
        let route = route(camera, capabilities)?;
        let steps = command.steps();

        // Build everything up front so an unsupported step never leaves the camera moving.
        let mut plan: Vec<(PtzStep, Option<WireRequest>)> = Vec::with_capacity(steps.len());
        for step in steps {
            plan.push((step, backends::build(&route.target, &step)?));
        }

        tracing::debug!(
            "PTZ {:?} on {} via {:?} ({} steps)",
            command.action,
            camera.id,
            route.target.kind,
            plan.len()
        );

        for (step, request) in plan {
            let Some(request) = request else {
                if let PtzStep::Wait(pause) = step {
                    tokio::time::sleep(pause).await;
                }
                continue;
            };
            match self.deliver(camera, &route, request).await? {
                Delivery::Accepted => {}
                Delivery::Rejected(reason) => {
                    tracing::warn!("PTZ step {:?} on {} rejected: {}", step, camera.id, reason);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn deliver(
        &self,
        camera: &CameraConfig,
        route: &PtzRoute,
        request: WireRequest,
    ) -> CameraResult<Delivery> {
        match request {
            WireRequest::Soap { url, body } => {
                let endpoint = camera.endpoint()?.with_credentials(route.credentials.clone());
                let client = self.negotiator.connect(&endpoint).await;
                match client.send_soap_request(&url, &body).await {
                    Ok(_) => Ok(Delivery::Accepted),
                    Err(e) if e.is_auth() => Err(CameraError::auth(url)),
                    Err(e) => Ok(Delivery::Rejected(e.to_string())),
                }
            }
            WireRequest::HttpGet { url } => {
                let builder = self.http_client(camera).get(&url);
                self.send_http(builder, &url, route).await
            }
            WireRequest::HttpPut { url, body } => {
                let builder = self
                    .http_client(camera)
                    .put(&url)
                    .header("Content-Type", "application/xml")
                    .body(body);
                self.send_http(builder, &url, route).await
            }
            WireRequest::HttpPostJson { url, body } => {
                let mut target = Url::parse(&url).map_err(|e| CameraError::malformed(e.to_string()))?;
                if let Some(creds) = &route.credentials {
                    target
                        .query_pairs_mut()
                        .append_pair("user", &creds.username)
                        .append_pair("password", &creds.password);
                }
                let response = self
                    .http_client(camera)
                    .post(target)
                    .json(&body)
                    .timeout(self.timeout)
                    .send()
                    .await;
                let response = match response {
                    Ok(r) => r,
                    Err(e) => return Ok(Delivery::Rejected(e.to_string())),
                };
                if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                    return Err(CameraError::auth(url));
                }
                if !response.status().is_success() {
                    return Ok(Delivery::Rejected(format!("HTTP {}", response.status())));
                }
                // api.cgi answers 200 with a per-command result code.
                match response.json::<serde_json::Value>().await {
                    Ok(reply) if reply[0]["code"] == 0 => Ok(Delivery::Accepted),
                    Ok(reply) => Ok(Delivery::Rejected(format!("api.cgi replied {}", reply))),
                    Err(e) => Ok(Delivery::Rejected(e.to_string())),
                }
            }
            WireRequest::Tcp { host, port, frame } => {
                let connect = tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), port)));
                let mut stream = match connect.await {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Ok(Delivery::Rejected(e.to_string())),
                    Err(_) => return Ok(Delivery::Rejected(format!("connect to {}:{} timed out", host, port))),
                };
                let write = async {
                    stream.write_all(&frame).await?;
                    stream.flush().await
                };
                match tokio::time::timeout(self.timeout, write).await {
                    Ok(Ok(())) => Ok(Delivery::Accepted),
                    Ok(Err(e)) => Ok(Delivery::Rejected(e.to_string())),
                    Err(_) => Ok(Delivery::Rejected("frame write timed out".to_string())),
                }
            }
        }
    }

    fn http_client(&self, camera: &CameraConfig) -> &reqwest::Client {
        self.http.client(camera.accept_self_signed_tls)
    }

    async fn send_http(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
        route: &PtzRoute,
    ) -> CameraResult<Delivery> {
        let builder = match &route.credentials {
            Some(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
            None => builder,
        };
        match builder.timeout(self.timeout).send().await {
            Ok(r) if matches!(r.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(CameraError::auth(url))
            }
            Ok(r) if r.status().is_success() => Ok(Delivery::Accepted),
            Ok(r) => Ok(Delivery::Rejected(format!("HTTP {}", r.status()))),
            Err(e) => Ok(Delivery::Rejected(e.to_string())),
        }
    }
}
