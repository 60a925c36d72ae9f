use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::camera::endpoint::Credentials;
use crate::onvif::soap::xml_escape;

/// WS-UsernameToken digest authentication.
///
/// `clock_offset` is the device clock minus the local clock. Many cameras reject tokens
/// whose `Created` stamp is outside a small window of their own (often unsynchronised) time.
#[derive(Debug, Clone)]
pub struct WsSecurityAuth {
    credentials: Credentials,
    clock_offset: Duration,
}

impl WsSecurityAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            clock_offset: Duration::zero(),
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn set_device_time(&mut self, device_now: DateTime<Utc>) {
        self.clock_offset = device_now - Utc::now();
        if self.clock_offset.num_seconds().abs() > 5 {
            tracing::debug!(
                "Device clock differs by {}s, adjusting token timestamps",
                self.clock_offset.num_seconds()
            );
        }
    }

    pub fn clock_offset(&self) -> Duration {
        self.clock_offset
    }

    pub fn generate_header(&self) -> String {
        let nonce = Uuid::new_v4().as_bytes().to_vec();
        let created = (Utc::now() + self.clock_offset)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        self.header_with(&nonce, &created)
    }

    fn header_with(&self, nonce: &[u8], created: &str) -> String {
        let digest = password_digest(nonce, created, &self.credentials.password);
        format!(
            r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
  <wsse:UsernameToken>
    <wsse:Username>{}</wsse:Username>
    <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password>
    <wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce>
    <wsu:Created>{}</wsu:Created>
  </wsse:UsernameToken>
</wsse:Security>"#,
            xml_escape(&self.credentials.username),
            digest,
            BASE64.encode(nonce),
            created
        )
    }
}

/// Base64(SHA1(nonce + created + password))
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}
