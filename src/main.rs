use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camscout::camera::{CameraManager, CapabilityCache};
use camscout::config::AppConfig;
use camscout::probe::{HttpClients, NetworkProbe, TlsPolicy};
use camscout::server;
use camscout::store::StateStore;
use camscout::{CameraService, TracingSink};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "config/camscout.yaml".to_string());

    let config = AppConfig::load_from_file(&config_path)
        .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!("camscout={},tower_http=debug", config.server.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camscout");
    tracing::info!("Loaded configuration from {} with {} cameras", config_path, config.cameras.len());

    let store = config.server.state_path.as_ref().map(StateStore::new);
    let persisted = match &store {
        Some(store) => store.load().context("Failed to load saved state")?,
        None => None,
    };

    let tls = TlsPolicy::new(config.network.accept_self_signed_tls);
    let cache = CapabilityCache::new();
    let camera_manager = CameraManager::new();

    if let Some(state) = persisted {
        tracing::info!(
            "Restoring {} cameras and {} cache entries from saved state",
            state.cameras.len(),
            state.capability_cache.len()
        );
        if state.accept_self_signed_tls {
            tls.set_accept_self_signed(true);
        }
        cache.restore(state.capability_cache).await;
        for camera_config in state.cameras {
            if let Err(e) = camera_manager.add_camera(camera_config).await {
                tracing::warn!("Skipping saved camera: {}", e);
            }
        }
    }

    // Cameras from the configuration file replace saved records with the same id.
    for camera_config in config.cameras.clone() {
        tracing::info!("Adding camera: {} ({})", camera_config.display_name(), camera_config.id);
        let camera_id = camera_config.id.clone();
        camera_manager
            .add_camera(camera_config)
            .await
            .with_context(|| format!("Invalid camera {}", camera_id))?;
    }

    let http = HttpClients::new(tls)?;
    let prober = Arc::new(NetworkProbe::new(http.clone()));
    let mut service = CameraService::new(
        camera_manager,
        cache,
        prober,
        http,
        config.service_options(),
        Arc::new(TracingSink),
    );
    if let Some(store) = store {
        tracing::info!("Persisting state to {}", store.path().display());
        service = service.with_store(store);
    }

    server::start_server(
        config.server.listen_address.clone(),
        PathBuf::from(&config.server.download_dir),
        service,
    )
    .await?;

    Ok(())
}
