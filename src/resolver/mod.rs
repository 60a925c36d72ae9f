//! Multi-strategy recording resolution: each operation is an ordered list of strategies
//! walked by one generic loop.

pub mod candidates;
pub mod context;
pub mod download;
pub mod engine;
pub mod playback;
pub mod search;
pub mod strategy;

pub use context::{ResolveContext, ResolverSettings};
pub use download::{DownloadReport, DownloadSource};
pub use engine::RecordingResolver;
pub use playback::{PlaybackSource, PlaybackUrl};
pub use strategy::{Outcome, Strategy};
