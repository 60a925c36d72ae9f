use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

use crate::camera::endpoint::{url_host, Credentials};
use crate::onvif::soap;
use crate::probe::{redact, HttpClients, ProbeStatus, Prober};

/// Probe backed by real sockets and the shared HTTP clients.
#[derive(Clone)]
pub struct NetworkProbe {
    http: HttpClients,
}

impl NetworkProbe {
    pub fn new(http: HttpClients) -> Self {
        Self { http }
    }

    /// A 401 only counts as a credential rejection when credentials went out with the
    /// request.
    fn classify(status: StatusCode, sent_credentials: bool) -> Option<ProbeStatus> {
        if status.is_success() || status == StatusCode::PARTIAL_CONTENT {
            Some(ProbeStatus::Reachable)
        } else if status == StatusCode::UNAUTHORIZED && sent_credentials {
            Some(ProbeStatus::AuthRequired)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Some(ProbeStatus::Denied)
        } else {
            None
        }
    }

    async fn request_status(
        &self,
        method: Method,
        url: &Url,
        credentials: Option<&Credentials>,
        accept_self_signed: bool,
        timeout: Duration,
        ranged: bool,
    ) -> Option<StatusCode> {
        let mut request = self
            .http
            .client(accept_self_signed)
            .request(method, url.clone())
            .timeout(timeout);
        if ranged {
            request = request.header(RANGE, "bytes=0-15");
        }
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        match request.send().await {
            Ok(response) => Some(response.status()),
            Err(e) => {
                tracing::trace!("HTTP probe {} failed: {}", redact(url), e);
                None
            }
        }
    }
}

#[async_trait]
impl Prober for NetworkProbe {
    async fn probe_http(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
        accept_self_signed: bool,
        timeout: Duration,
    ) -> ProbeStatus {
        let sent_credentials = credentials.is_some();
        let head = self
            .request_status(Method::HEAD, url, credentials, accept_self_signed, timeout, false)
            .await;
        let Some(head) = head else {
            return ProbeStatus::Unreachable;
        };
        if let Some(status) = Self::classify(head, sent_credentials) {
            tracing::debug!("HEAD {} -> {}", redact(url), head);
            return status;
        }

        // Plenty of embedded servers reject HEAD; a 16-byte ranged GET settles it.
        let get = self
            .request_status(Method::GET, url, credentials, accept_self_signed, timeout, true)
            .await;
        let status = get
            .and_then(|code| Self::classify(code, sent_credentials))
            .unwrap_or(ProbeStatus::Unreachable);
        tracing::debug!("GET(range) {} -> {:?}", redact(url), status);
        status
    }

    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> bool {
        let addr = format!("{}:{}", url_host(host), port);
        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                tracing::trace!("TCP probe {} refused: {}", addr, e);
                false
            }
            Err(_) => {
                tracing::trace!("TCP probe {} timed out", addr);
                false
            }
        }
    }

    async fn probe_onvif(&self, url: &Url, accept_self_signed: bool, timeout: Duration) -> ProbeStatus {
        let body = soap::envelope(None, soap::GET_SYSTEM_DATE_AND_TIME);
        let response = self
            .http
            .client(accept_self_signed)
            .post(url.clone())
            .header("Content-Type", soap::CONTENT_TYPE)
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::trace!("ONVIF probe {} failed: {}", redact(url), e);
                return ProbeStatus::Unreachable;
            }
        };

        // Sent without credentials, so a 401 still proves a device service is there.
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return ProbeStatus::Denied;
        }
        match response.text().await {
            Ok(text) if text.contains("Envelope") => ProbeStatus::Reachable,
            _ => ProbeStatus::Unreachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::TlsPolicy;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::Router;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn probe() -> NetworkProbe {
        NetworkProbe::new(HttpClients::new(TlsPolicy::default()).unwrap())
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_ranged_get() {
        // axum answers HEAD on a GET route; a POST-only route makes HEAD fail with 405.
        let app = Router::new()
            .route("/clip.mp4", get(|| async { (AxumStatus::PARTIAL_CONTENT, "0123456789abcdef") }))
            .route("/post-only", post(|| async { "ok" }));
        let base = serve(app).await;

        let ok = Url::parse(&format!("{}/clip.mp4", base)).unwrap();
        assert_eq!(
            probe().probe_http(&ok, None, false, Duration::from_secs(2)).await,
            ProbeStatus::Reachable
        );

        let rejected = Url::parse(&format!("{}/post-only", base)).unwrap();
        assert_eq!(
            probe().probe_http(&rejected, None, false, Duration::from_secs(2)).await,
            ProbeStatus::Unreachable
        );
    }

    #[tokio::test]
    async fn test_unauthorized_needs_sent_credentials() {
        let app = Router::new()
            .route("/secure", get(|| async { AxumStatus::UNAUTHORIZED }))
            .route("/forbidden", get(|| async { AxumStatus::FORBIDDEN }));
        let base = serve(app).await;
        let p = probe();
        let secure = Url::parse(&format!("{}/secure", base)).unwrap();
        let forbidden = Url::parse(&format!("{}/forbidden", base)).unwrap();
        let creds = Credentials::new("admin", "wrong");

        assert_eq!(
            p.probe_http(&secure, Some(&creds), false, Duration::from_secs(2)).await,
            ProbeStatus::AuthRequired
        );
        assert_eq!(
            p.probe_http(&secure, None, false, Duration::from_secs(2)).await,
            ProbeStatus::Denied
        );
        // 403 is a refusal of the path, whatever was sent.
        assert_eq!(
            p.probe_http(&forbidden, Some(&creds), false, Duration::from_secs(2)).await,
            ProbeStatus::Denied
        );
        assert!(ProbeStatus::Denied.is_present());
        assert!(!ProbeStatus::Denied.is_reachable());
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let app = Router::new()
            .route(
                "/login.html",
                get(|| async { "<html>Please log in</html>" }),
            )
            .fallback(|| async {
                (
                    AxumStatus::TEMPORARY_REDIRECT,
                    [(axum::http::header::LOCATION, "/login.html")],
                )
            });
        let base = serve(app).await;
        let url = Url::parse(&format!("{}/recordings/clip001.mp4", base)).unwrap();
        assert_eq!(
            probe().probe_http(&url, None, false, Duration::from_secs(2)).await,
            ProbeStatus::Unreachable
        );
    }

    #[tokio::test]
    async fn test_closed_port_fails_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let p = probe();
        assert!(!p.probe_tcp("127.0.0.1", port, Duration::from_millis(500)).await);
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert_eq!(
            p.probe_http(&url, None, false, Duration::from_millis(500)).await,
            ProbeStatus::Unreachable
        );
    }

    #[tokio::test]
    async fn test_tcp_probe_connects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe().probe_rtsp_port("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_onvif_probe_requires_envelope() {
        let app = Router::new()
            .route(
                "/onvif/device_service",
                post(|| async {
                    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body/></s:Envelope>"#
                }),
            )
            .route("/other", post(|| async { "<html>login</html>" }));
        let base = serve(app).await;
        let p = probe();

        let onvif = Url::parse(&format!("{}/onvif/device_service", base)).unwrap();
        assert_eq!(p.probe_onvif(&onvif, false, Duration::from_secs(2)).await, ProbeStatus::Reachable);

        let web = Url::parse(&format!("{}/other", base)).unwrap();
        assert_eq!(p.probe_onvif(&web, false, Duration::from_secs(2)).await, ProbeStatus::Unreachable);
    }
}
