use reqwest::StatusCode;
use std::time::Duration;

use crate::camera::endpoint::CameraEndpoint;
use crate::onvif::auth::WsSecurityAuth;
use crate::onvif::soap::{self, SoapError};
use crate::onvif::xml::XmlNode;
use crate::probe::HttpClients;

/// SOAP transport bound to one camera endpoint.
#[derive(Clone)]
pub struct CameraClient {
    endpoint: CameraEndpoint,
    http: HttpClients,
    auth: Option<WsSecurityAuth>,
    timeout: Duration,
}

impl CameraClient {
    pub fn new(endpoint: CameraEndpoint, http: HttpClients, timeout: Duration) -> Self {
        let auth = endpoint.credentials().cloned().map(WsSecurityAuth::new);
        Self {
            endpoint,
            http,
            auth,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        &self.endpoint
    }

    pub fn base_url(&self) -> String {
        let scheme = match self.endpoint.port() {
            443 | 8443 => "https",
            _ => "http",
        };
        format!("{}://{}:{}", scheme, self.endpoint.url_host(), self.endpoint.port())
    }

    pub fn device_service_url(&self) -> String {
        format!("{}/onvif/device_service", self.base_url())
    }

    pub fn has_credentials(&self) -> bool {
        self.auth.is_some()
    }

    /// Aligns WS-Security timestamps with the device clock.
    pub fn set_device_time(&mut self, device_now: chrono::DateTime<chrono::Utc>) {
        if let Some(auth) = self.auth.as_mut() {
            auth.set_device_time(device_now);
        }
    }

    pub async fn send_soap_request(&self, url: &str, soap_body: &str) -> Result<XmlNode, SoapError> {
        self.send(url, soap_body, true).await
    }

    pub async fn send_soap_request_no_auth(
        &self,
        url: &str,
        soap_body: &str,
    ) -> Result<XmlNode, SoapError> {
        self.send(url, soap_body, false).await
    }

    async fn send(&self, url: &str, soap_body: &str, use_auth: bool) -> Result<XmlNode, SoapError> {
        let header = match (&self.auth, use_auth) {
            (Some(auth), true) => Some(auth.generate_header()),
            _ => None,
        };
        let soap_request = soap::envelope(header.as_deref(), soap_body);

        tracing::trace!("Sending SOAP request to {} (auth={})", url, header.is_some());

        let response = self
            .http
            .client(self.endpoint.accepts_self_signed_tls())
            .post(url)
            .header("Content-Type", soap::CONTENT_TYPE)
            .body(soap_request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SoapError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SoapError::Unauthorized);
        }
        let response_text = response
            .text()
            .await
            .map_err(|e| SoapError::Transport(e.to_string()))?;

        tracing::trace!("Received SOAP response from {}: {}", url, response_text);

        match soap::parse_response(&response_text) {
            Ok(payload) if status.is_success() => Ok(payload),
            // Faults usually arrive with 400/500; the fault is more useful than the status.
            Err(SoapError::Fault(fault)) => Err(SoapError::Fault(fault)),
            Ok(_) => Err(SoapError::Status(status.as_u16())),
            Err(e) if status.is_success() => Err(e),
            Err(_) => Err(SoapError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::endpoint::Credentials;
    use crate::probe::TlsPolicy;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::Router;

    async fn serve(app: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    fn client(port: u16, creds: Option<Credentials>) -> CameraClient {
        let endpoint = CameraEndpoint::new("127.0.0.1", port)
            .unwrap()
            .with_credentials(creds);
        CameraClient::new(
            endpoint,
            HttpClients::new(TlsPolicy::default()).unwrap(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_security_header_only_with_credentials() {
        let app = Router::new().route(
            "/onvif/device_service",
            post(|body: String| async move {
                let marker = if body.contains("UsernameToken") { "signed" } else { "plain" };
                format!(
                    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><R>{}</R></s:Body></s:Envelope>"#,
                    marker
                )
            }),
        );
        let port = serve(app).await;

        let signed = client(port, Some(Credentials::new("admin", "pw")));
        let url = signed.device_service_url();
        let payload = signed.send_soap_request(&url, "<X/>").await.unwrap();
        assert_eq!(payload.text, "signed");

        let payload = signed.send_soap_request_no_auth(&url, "<X/>").await.unwrap();
        assert_eq!(payload.text, "plain");

        let anonymous = client(port, None);
        let payload = anonymous.send_soap_request(&url, "<X/>").await.unwrap();
        assert_eq!(payload.text, "plain");
    }

    #[tokio::test]
    async fn test_http_401_is_unauthorized() {
        let app = Router::new().route(
            "/onvif/device_service",
            post(|| async { AxumStatus::UNAUTHORIZED }),
        );
        let port = serve(app).await;
        let c = client(port, Some(Credentials::new("admin", "bad")));
        let err = c
            .send_soap_request(&c.device_service_url(), "<X/>")
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_fault_survives_error_status() {
        let app = Router::new().route(
            "/onvif/device_service",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code><s:Reason><s:Text>nope</s:Text></s:Reason></s:Fault></s:Body></s:Envelope>"#,
                )
            }),
        );
        let port = serve(app).await;
        let c = client(port, None);
        match c.send_soap_request(&c.device_service_url(), "<X/>").await {
            Err(SoapError::Fault(f)) => assert_eq!(f.reason, "nope"),
            other => panic!("expected fault, got {:?}", other.map(|n| n.name)),
        }
    }
}
