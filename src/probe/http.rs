use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide switch for accepting self-signed certificates on HTTPS targets.
///
/// It only changes when set explicitly: certificate validation failures never flip it.
/// Mutations are picked up by the next request; requests already in flight keep the
/// client they started with.
#[derive(Debug, Clone, Default)]
pub struct TlsPolicy {
    accept_self_signed: Arc<AtomicBool>,
}

impl TlsPolicy {
    pub fn new(accept_self_signed: bool) -> Self {
        Self {
            accept_self_signed: Arc::new(AtomicBool::new(accept_self_signed)),
        }
    }

    pub fn set_accept_self_signed(&self, accept: bool) {
        let previous = self.accept_self_signed.swap(accept, Ordering::SeqCst);
        if previous != accept {
            tracing::warn!("Self-signed TLS acceptance changed: {} -> {}", previous, accept);
        }
    }

    pub fn accepts_self_signed(&self) -> bool {
        self.accept_self_signed.load(Ordering::SeqCst)
    }

    /// Effective acceptance for one endpoint: the global switch or the endpoint's own
    /// stored opt-in.
    pub fn accepts_for(&self, endpoint_opt_in: bool) -> bool {
        endpoint_opt_in || self.accepts_self_signed()
    }
}

/// Shared HTTP clients: one validating, one accepting self-signed certificates.
#[derive(Clone)]
pub struct HttpClients {
    strict: Client,
    permissive: Client,
    tls: TlsPolicy,
}

impl HttpClients {
    pub fn new(tls: TlsPolicy) -> Result<Self> {
        let strict = Self::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let permissive = Self::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create permissive HTTP client")?;

        Ok(Self {
            strict,
            permissive,
            tls,
        })
    }

    /// Redirects are never followed: a camera that bounces unknown paths to its login
    /// page must not make the path look served.
    fn builder() -> reqwest::ClientBuilder {
        Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(1)
            .user_agent(concat!("camscout/", env!("CARGO_PKG_VERSION")))
    }

    pub fn tls(&self) -> &TlsPolicy {
        &self.tls
    }

    pub fn client(&self, endpoint_opt_in: bool) -> &Client {
        if self.tls.accepts_for(endpoint_opt_in) {
            &self.permissive
        } else {
            &self.strict
        }
    }
}
