pub mod auth;
pub mod device;
pub mod events;
pub mod media;
pub mod negotiator;
pub mod ptz;
pub mod quirks;
pub mod recording;
pub mod soap;
pub mod types;
pub mod xml;

pub use negotiator::OnvifNegotiator;
pub use soap::{SoapError, SoapFault};
