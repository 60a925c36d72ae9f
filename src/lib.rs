//! IP camera discovery, ONVIF negotiation, recording retrieval and PTZ control.

pub mod camera;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ftp;
pub mod knowledge;
pub mod onvif;
pub mod probe;
pub mod ptz;
pub mod resolver;
pub mod server;
pub mod service;
pub mod store;

pub use error::{CameraError, CameraResult, StrategyKind};
pub use service::{CameraService, OperationOutcome, OutcomeSink, TracingSink};
