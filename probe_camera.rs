// Diagnostic program: detect protocols, negotiate ONVIF and pick a live stream for one camera
// Run with: cargo run --bin probe_camera -- <host> [username] [password] [manufacturer]

use std::sync::Arc;

use camscout::camera::{CameraConfig, CameraManager, CapabilityCache};
use camscout::probe::{HttpClients, NetworkProbe, TlsPolicy};
use camscout::ptz::StreamQuality;
use camscout::service::{CameraService, ServiceOptions, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(host) = args.next() else {
        anyhow::bail!("usage: probe_camera <host> [username] [password] [manufacturer]");
    };

    let mut config = CameraConfig::new("probe", host, 80);
    config.username = args.next();
    config.password = args.next();
    config.manufacturer = args.next();

    let http = HttpClients::new(TlsPolicy::new(true))?;
    let cameras = CameraManager::new();
    cameras.add_camera(config).await?;
    let service = CameraService::new(
        cameras,
        CapabilityCache::new(),
        Arc::new(NetworkProbe::new(http.clone())),
        http,
        ServiceOptions::default(),
        Arc::new(TracingSink),
    );

    println!("\n=== Protocol detection ===");
    match service.detect_protocols("probe", true).await {
        Ok(detection) => println!("{}", serde_json::to_string_pretty(&detection)?),
        Err(e) => eprintln!("Detection error: {}", e),
    }

    println!("\n=== Capabilities ===");
    match service.negotiate_capabilities("probe", true).await {
        Ok(caps) => println!("{}", serde_json::to_string_pretty(&caps)?),
        Err(e) => eprintln!("Negotiation error: {}", e),
    }

    for quality in [StreamQuality::Sub, StreamQuality::Main] {
        println!("\n=== Stream ({:?}) ===", quality);
        match service.select_stream("probe", quality).await {
            Ok(selection) => println!("{}", serde_json::to_string_pretty(&selection)?),
            Err(e) => eprintln!("Stream error: {}", e),
        }
    }

    Ok(())
}
