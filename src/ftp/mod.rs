//! Hand-rolled FTP client used for recording listing and retrieval.

pub mod client;
pub mod codec;
pub mod error;
pub mod listing;
pub mod passive;

pub use client::{download, FtpClient, FtpTarget};
pub use error::{FtpError, FtpResult};
pub use listing::FtpEntry;
