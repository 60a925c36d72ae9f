use serde::{Deserialize, Serialize};
use url::Url;

use crate::camera::endpoint::{CameraEndpoint, Credentials, Transport};
use crate::error::{CameraError, CameraResult};
use crate::ptz::PtzBackendKind;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub ftp_port: Option<u16>,
    #[serde(default)]
    pub accept_self_signed_tls: bool,
    #[serde(default)]
    pub ptz_override: Option<PtzOverride>,
}

/// Explicit PTZ wiring for a camera whose capability detection did not report PTZ.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PtzOverride {
    pub backend: PtzBackendKind,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_pelco_address")]
    pub pelco_address: u8,
}

fn default_port() -> u16 {
    80
}

fn default_channel() -> u8 {
    1
}

fn default_pelco_address() -> u8 {
    1
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            host: host.into(),
            port,
            username: None,
            password: None,
            transport: Transport::Tcp,
            manufacturer: None,
            stream_url: None,
            http_port: None,
            ftp_port: None,
            accept_self_signed_tls: false,
            ptz_override: None,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(user), pass) if !user.is_empty() => {
                Some(Credentials::new(user.clone(), pass.clone().unwrap_or_default()))
            }
            _ => None,
        }
    }

    pub fn endpoint(&self) -> CameraResult<CameraEndpoint> {
        Ok(CameraEndpoint::new(&self.host, self.port)?
            .with_credentials(self.credentials())
            .with_transport(self.transport)
            .with_self_signed_tls(self.accept_self_signed_tls))
    }

    /// The declared stream URL, if any. A URL that does not parse is a caller error.
    pub fn parsed_stream_url(&self) -> CameraResult<Option<Url>> {
        match self.stream_url.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|e| CameraError::malformed(format!("stream url {}: {}", raw, e))),
        }
    }

    pub fn declares_rtsp(&self) -> bool {
        matches!(self.parsed_stream_url(), Ok(Some(u)) if u.scheme().eq_ignore_ascii_case("rtsp"))
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}
