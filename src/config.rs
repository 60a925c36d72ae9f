use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::CameraConfig;
use crate::knowledge::ScanTimeouts;
use crate::resolver::ResolverSettings;
use crate::service::ServiceOptions;

pub const ENV_PREFIX: &str = "CAMSCOUT";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scan_timeouts: ScanTimeouts,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// YAML state file for cameras and the capability cache. Nothing is persisted when unset.
    #[serde(default)]
    pub state_path: Option<String>,
    /// Downloads requested through the API land here.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    #[serde(default)]
    pub accept_self_signed_tls: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_rtsp_timeout_ms")]
    pub rtsp_timeout_ms: u64,
    #[serde(default = "default_onvif_timeout_ms")]
    pub onvif_timeout_ms: u64,
    #[serde(default = "default_ptz_timeout_ms")]
    pub ptz_timeout_ms: u64,
    #[serde(default = "default_http_download_timeout_secs")]
    pub http_download_timeout_secs: u64,
    #[serde(default = "default_ftp_timeout_ms")]
    pub ftp_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub live_stream_fallback: bool,
    #[serde(default = "default_discovery_concurrency")]
    pub discovery_concurrency: usize,
    #[serde(default = "default_discovery_deadline_secs")]
    pub discovery_deadline_secs: u64,
    #[serde(default = "default_ws_discovery_timeout_ms")]
    pub ws_discovery_timeout_ms: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:8088".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_rtsp_timeout_ms() -> u64 {
    2_000
}

fn default_onvif_timeout_ms() -> u64 {
    5_000
}

fn default_ptz_timeout_ms() -> u64 {
    3_000
}

fn default_http_download_timeout_secs() -> u64 {
    120
}

fn default_ftp_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_discovery_concurrency() -> usize {
    32
}

fn default_discovery_deadline_secs() -> u64 {
    90
}

fn default_ws_discovery_timeout_ms() -> u64 {
    3_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            state_path: None,
            download_dir: default_download_dir(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            accept_self_signed_tls: false,
            probe_timeout_ms: default_probe_timeout_ms(),
            rtsp_timeout_ms: default_rtsp_timeout_ms(),
            onvif_timeout_ms: default_onvif_timeout_ms(),
            ptz_timeout_ms: default_ptz_timeout_ms(),
            http_download_timeout_secs: default_http_download_timeout_secs(),
            ftp_timeout_ms: default_ftp_timeout_ms(),
            live_stream_fallback: true,
            discovery_concurrency: default_discovery_concurrency(),
            discovery_deadline_secs: default_discovery_deadline_secs(),
            ws_discovery_timeout_ms: default_ws_discovery_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            rtsp_timeout: Duration::from_millis(self.rtsp_timeout_ms),
            download_timeout: Duration::from_secs(self.http_download_timeout_secs),
            ftp_timeout: Duration::from_millis(self.ftp_timeout_ms),
            live_stream_fallback: self.live_stream_fallback,
        }
    }
}

impl AppConfig {
    /// Loads the YAML file (optional) and overlays `CAMSCOUT__SECTION__KEY` variables.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let source = config::File::new(path, config::FileFormat::Yaml).required(false);
        Self::build(config::Config::builder().add_source(source))
    }

    pub fn load_from_str(yaml: &str) -> Result<Self> {
        let source = config::File::from_str(yaml, config::FileFormat::Yaml);
        Self::build(config::Config::builder().add_source(source))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id.as_str()) {
                anyhow::bail!("Duplicate camera id in configuration: {}", camera.id);
            }
        }
        Ok(())
    }

    pub fn get_camera(&self, camera_id: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == camera_id)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            resolver: self.network.resolver_settings(),
            scan_timeouts: self.scan_timeouts,
            onvif_timeout: Duration::from_millis(self.network.onvif_timeout_ms),
            ptz_timeout: Duration::from_millis(self.network.ptz_timeout_ms),
            discovery_deadline: Duration::from_secs(self.network.discovery_deadline_secs),
            discovery_concurrency: self.network.discovery_concurrency,
            ws_discovery_timeout: Duration::from_millis(self.network.ws_discovery_timeout_ms),
        }
    }
}
