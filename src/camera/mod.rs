pub mod cache;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod manager;
pub mod types;

pub use cache::CapabilityCache;
pub use client::CameraClient;
pub use config::CameraConfig;
pub use endpoint::{CameraEndpoint, Credentials, Transport};
pub use manager::CameraManager;
