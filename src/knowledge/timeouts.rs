use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanScenario {
    Fast,
    Common,
    Rtsp,
    Full,
}

impl ScanScenario {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "common" => Some(Self::Common),
            "rtsp" => Some(Self::Rtsp),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTimeouts {
    #[serde(default = "default_fast_ms")]
    pub fast_ms: u64,
    #[serde(default = "default_common_ms")]
    pub common_ms: u64,
    #[serde(default = "default_rtsp_ms")]
    pub rtsp_ms: u64,
    #[serde(default = "default_full_ms")]
    pub full_ms: u64,
}

fn default_fast_ms() -> u64 {
    600
}

fn default_common_ms() -> u64 {
    1_500
}

fn default_rtsp_ms() -> u64 {
    2_000
}

fn default_full_ms() -> u64 {
    5_000
}

impl Default for ScanTimeouts {
    fn default() -> Self {
        Self {
            fast_ms: default_fast_ms(),
            common_ms: default_common_ms(),
            rtsp_ms: default_rtsp_ms(),
            full_ms: default_full_ms(),
        }
    }
}

impl ScanTimeouts {
    pub fn for_scenario(&self, scenario: ScanScenario) -> Duration {
        let ms = match scenario {
            ScanScenario::Fast => self.fast_ms,
            ScanScenario::Common => self.common_ms,
            ScanScenario::Rtsp => self.rtsp_ms,
            ScanScenario::Full => self.full_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn named(&self, name: &str) -> Option<Duration> {
        ScanScenario::from_name(name).map(|s| self.for_scenario(s))
    }
}

const PLAYER_BASE_TIMEOUT: Duration = Duration::from_secs(5);
const PLAYER_MAX_TIMEOUT: Duration = Duration::from_secs(30);

/// Player initialisation retries wait progressively longer: 5s, 10s, 15s ... capped at 30s.
pub fn player_retry_timeout(attempt: u32) -> Duration {
    let scaled = PLAYER_BASE_TIMEOUT * attempt.saturating_add(1);
    scaled.min(PLAYER_MAX_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_ordered() {
        let t = ScanTimeouts::default();
        assert!(t.for_scenario(ScanScenario::Fast) < t.for_scenario(ScanScenario::Common));
        assert!(t.for_scenario(ScanScenario::Common) < t.for_scenario(ScanScenario::Full));
        assert_eq!(t.named("RTSP"), Some(Duration::from_millis(2_000)));
        assert_eq!(t.named("slow"), None);
    }

    #[test]
    fn test_player_timeouts_escalate() {
        assert_eq!(player_retry_timeout(0), Duration::from_secs(5));
        assert_eq!(player_retry_timeout(1), Duration::from_secs(10));
        assert!(player_retry_timeout(2) > player_retry_timeout(1));
        assert_eq!(player_retry_timeout(50), Duration::from_secs(30));
    }
}
