pub mod engine;
pub mod subnet;
pub mod ws_discovery;

pub use engine::DiscoveryEngine;
pub use ws_discovery::DiscoveredDevice;
