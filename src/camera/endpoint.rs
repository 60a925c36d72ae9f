use crate::error::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous@")
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

/// A single reachable network target. Constructed only through [`CameraEndpoint::new`], so a
/// value always carries a syntactically valid host and a non-zero port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint", into = "RawEndpoint")]
pub struct CameraEndpoint {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    transport: Transport,
    accept_self_signed_tls: bool,
}

#[derive(Serialize, Deserialize)]
struct RawEndpoint {
    host: String,
    port: u32,
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default)]
    transport: Transport,
    #[serde(default)]
    accept_self_signed_tls: bool,
}

impl TryFrom<RawEndpoint> for CameraEndpoint {
    type Error = CameraError;

    fn try_from(raw: RawEndpoint) -> CameraResult<Self> {
        let port = u16::try_from(raw.port)
            .map_err(|_| CameraError::malformed(format!("port {} out of range", raw.port)))?;
        let mut endpoint = CameraEndpoint::new(raw.host, port)?;
        endpoint.credentials = raw.credentials;
        endpoint.transport = raw.transport;
        endpoint.accept_self_signed_tls = raw.accept_self_signed_tls;
        Ok(endpoint)
    }
}

impl From<CameraEndpoint> for RawEndpoint {
    fn from(e: CameraEndpoint) -> Self {
        RawEndpoint {
            host: e.host,
            port: u32::from(e.port),
            credentials: e.credentials,
            transport: e.transport,
            accept_self_signed_tls: e.accept_self_signed_tls,
        }
    }
}

impl CameraEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> CameraResult<Self> {
        let host = normalize_host(&host.into())?;
        if port == 0 {
            return Err(CameraError::malformed("port must be in 1..=65535"));
        }
        Ok(Self {
            host,
            port,
            credentials: None,
            transport: Transport::Tcp,
            accept_self_signed_tls: false,
        })
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials.filter(|c| !c.username.is_empty());
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_self_signed_tls(mut self, accept: bool) -> Self {
        self.accept_self_signed_tls = accept;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn accepts_self_signed_tls(&self) -> bool {
        self.accept_self_signed_tls
    }

    /// Same target on another port, keeping credentials and TLS preference.
    pub fn on_port(&self, port: u16) -> CameraResult<Self> {
        if port == 0 {
            return Err(CameraError::malformed("port must be in 1..=65535"));
        }
        let mut other = self.clone();
        other.port = port;
        Ok(other)
    }

    /// Host formatted for use inside a URL authority (IPv6 literals bracketed).
    pub fn url_host(&self) -> String {
        url_host(&self.host)
    }
}

pub fn url_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => host.to_string(),
    }
}

/// Addresses that are only meaningful inside the device's own network.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_link_local() || v4.is_loopback() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Accepts IP literals (IPv6 optionally bracketed) and RFC 1123 host names.
pub fn normalize_host(raw: &str) -> CameraResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CameraError::malformed("host must not be empty"));
    }

    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(trimmed);
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }

    if trimmed.len() > 253 {
        return Err(CameraError::malformed(format!("host name too long: {}", trimmed)));
    }
    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    let name = trimmed.trim_end_matches('.');
    // All-numeric dotted names that failed IP parsing are typos, not host names.
    let looks_numeric = name.split('.').all(|l| l.chars().all(|c| c.is_ascii_digit()));
    if looks_numeric || !name.split('.').all(valid_label) {
        return Err(CameraError::malformed(format!("invalid host: {}", trimmed)));
    }
    Ok(name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hosts() {
        assert_eq!(normalize_host(" 192.168.1.50 ").unwrap(), "192.168.1.50");
        assert_eq!(normalize_host("Cam-01.local").unwrap(), "cam-01.local");
        assert_eq!(normalize_host("[fe80::1]").unwrap(), "fe80::1");
    }

    #[test]
    fn test_invalid_hosts_fail_fast() {
        for bad in ["", "  ", "256.1.1.1", "bad_host", "-lead.example", "a..b", "http://cam"] {
            assert!(
                matches!(normalize_host(bad), Err(CameraError::MalformedInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_port_zero_rejected() {
        assert!(CameraEndpoint::new("10.0.0.2", 0).is_err());
        let ep = CameraEndpoint::new("10.0.0.2", 554).unwrap();
        assert!(ep.on_port(0).is_err());
        assert_eq!(ep.on_port(80).unwrap().port(), 80);
    }

    #[test]
    fn test_deserialize_validates() {
        let bad: Result<CameraEndpoint, _> =
            serde_json::from_str(r#"{"host":"10.0.0.2","port":70000}"#);
        assert!(bad.is_err());

        let good: CameraEndpoint =
            serde_json::from_str(r#"{"host":"10.0.0.2","port":8000,"transport":"udp"}"#).unwrap();
        assert_eq!(good.transport(), Transport::Udp);
        assert!(good.credentials().is_none());
    }

    #[test]
    fn test_ipv6_url_host() {
        let ep = CameraEndpoint::new("fe80::1", 80).unwrap();
        assert_eq!(ep.url_host(), "[fe80::1]");
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
