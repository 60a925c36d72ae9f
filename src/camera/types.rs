use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{CameraError, CameraResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Onvif,
    Http,
    Proprietary,
    Rtsp,
}

/// Per-candidate probe state. `Reachable` and `Unreachable` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "protocol")]
pub enum ProbeState {
    Unprobed,
    Probing,
    Reachable(ProtocolKind),
    Unreachable,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProbeState::Reachable(_) | ProbeState::Unreachable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProbe {
    pub protocol: ProtocolKind,
    pub port: u16,
    pub state: ProbeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDetectionResult {
    pub host: String,
    pub onvif_available: bool,
    pub proprietary_available: bool,
    pub rtsp_available: bool,
    #[serde(default)]
    pub detected_ports: BTreeMap<ProtocolKind, u16>,
    #[serde(default)]
    pub error: Option<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<CandidateProbe>,
}

impl ProtocolDetectionResult {
    pub fn has_any_protocol(&self) -> bool {
        self.onvif_available || self.proprietary_available || self.rtsp_available
    }

    pub fn port(&self, kind: ProtocolKind) -> Option<u16> {
        self.detected_ports.get(&kind).copied()
    }
}

/// Three-valued capability fact: "not yet probed" is distinct from "probed and absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tristate {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Tristate {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Tristate::Yes
        } else {
            Tristate::No
        }
    }

    pub fn is_no(&self) -> bool {
        matches!(self, Tristate::No)
    }
}

/// Absolute service URLs reported by an ONVIF device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnvifServiceMap {
    pub device: Option<String>,
    pub media: Option<String>,
    pub ptz: Option<String>,
    pub events: Option<String>,
    pub imaging: Option<String>,
    pub recording: Option<String>,
    pub search: Option<String>,
    pub replay: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub has_ptz: bool,
}

impl StreamProfile {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub has_ptz: bool,
    pub has_audio: bool,
    pub has_motion_detection: bool,
    pub has_recording: bool,
    pub has_recording_search: bool,
    pub has_recording_download: bool,
    pub supports_onvif_profile_g: Tristate,
    #[serde(default)]
    pub available_profiles: Vec<StreamProfile>,
    #[serde(default)]
    pub services: OnvifServiceMap,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordingDescriptor {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub recording_type: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn validate(&self) -> CameraResult<()> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end < start => {
                Err(CameraError::malformed("time range ends before it starts"))
            }
            _ => Ok(()),
        }
    }

    /// Whether a recording spanning `[from, to]` overlaps this range. Missing bounds on the
    /// recording side are treated as open, so recordings without times are kept.
    pub fn overlaps(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        let to = to.or(from);
        let from = from.or(to);
        if let (Some(range_start), Some(rec_end)) = (self.start, to) {
            if rec_end < range_start {
                return false;
            }
        }
        if let (Some(range_end), Some(rec_start)) = (self.end, from) {
            if rec_start > range_end {
                return false;
            }
        }
        true
    }
}

/// Type filter. Recordings whose source reports no type are kept: listing-based sources
/// never know it.
pub fn matches_recording_type(descriptor: &RecordingDescriptor, wanted: Option<&str>) -> bool {
    match (wanted, descriptor.recording_type.as_deref()) {
        (None, _) => true,
        (Some(w), _) if w.eq_ignore_ascii_case("all") => true,
        (Some(w), Some(actual)) => w.eq_ignore_ascii_case(actual),
        (Some(_), None) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_all_false_detection_has_no_protocol() {
        let result = ProtocolDetectionResult {
            host: "10.0.0.9".into(),
            onvif_available: false,
            proprietary_available: false,
            rtsp_available: false,
            detected_ports: BTreeMap::new(),
            error: Some("no protocol responded".into()),
            detected_at: Utc::now(),
            probes: vec![],
        };
        assert!(!result.has_any_protocol());

        let rtsp_only = ProtocolDetectionResult {
            rtsp_available: true,
            ..result
        };
        assert!(rtsp_only.has_any_protocol());
    }

    #[test]
    fn test_time_range_overlap() {
        let range = TimeRange::new(Some(ts(10)), Some(ts(12)));
        assert!(range.overlaps(Some(ts(9)), Some(ts(11))));
        assert!(range.overlaps(Some(ts(11)), None));
        assert!(!range.overlaps(Some(ts(13)), Some(ts(14))));
        assert!(!range.overlaps(Some(ts(7)), Some(ts(8))));
        assert!(range.overlaps(None, None));
        assert!(TimeRange::default().overlaps(Some(ts(1)), Some(ts(2))));
    }

    #[test]
    fn test_tristate_defaults_to_unknown() {
        let caps = CameraCapabilities::default();
        assert_eq!(caps.supports_onvif_profile_g, Tristate::Unknown);
        assert!(!caps.supports_onvif_profile_g.is_no());
    }

    #[test]
    fn test_recording_type_filter() {
        let rec = RecordingDescriptor {
            recording_type: Some("Motion".into()),
            ..Default::default()
        };
        assert!(matches_recording_type(&rec, None));
        assert!(matches_recording_type(&rec, Some("motion")));
        assert!(matches_recording_type(&rec, Some("all")));
        assert!(!matches_recording_type(&rec, Some("alarm")));
        assert!(matches_recording_type(&RecordingDescriptor::default(), Some("alarm")));
    }
}
