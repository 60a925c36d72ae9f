pub mod paths;
pub mod ports;
pub mod timeouts;

pub use ports::{dynamic_priority_ports, manufacturer_ports, PortTable, PortWeights};
pub use timeouts::{player_retry_timeout, ScanScenario, ScanTimeouts};
