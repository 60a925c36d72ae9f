use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

/// One entry of a `GetServices` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub namespace: String,
    pub xaddr: String,
    pub version: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUri {
    pub uri: String,
    pub invalid_after_connect: bool,
    pub invalid_after_reboot: bool,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Queued,
    Searching,
    Completed,
    Unknown,
}

impl SearchState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Queued" => SearchState::Queued,
            "Searching" => SearchState::Searching,
            "Completed" => SearchState::Completed,
            _ => SearchState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProperties {
    /// Slash-joined topic paths, e.g. `RuleEngine/CellMotionDetector/Motion`.
    pub topics: Vec<String>,
}

impl EventProperties {
    pub fn has_motion_detection(&self) -> bool {
        self.topics.iter().any(|t| t.contains("Motion"))
    }
}
