use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The strategy families a top-level operation can walk through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    OnvifProbe,
    HttpProbe,
    ProprietaryProbe,
    RtspProbe,
    OnvifProfileG,
    OnvifRecordingService,
    FtpListing,
    HttpIndexListing,
    MetadataUrl,
    HttpTemplates,
    FtpTemplates,
    RtspFallback,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::OnvifProbe => "onvif-probe",
            StrategyKind::HttpProbe => "http-probe",
            StrategyKind::ProprietaryProbe => "proprietary-probe",
            StrategyKind::RtspProbe => "rtsp-probe",
            StrategyKind::OnvifProfileG => "onvif-profile-g",
            StrategyKind::OnvifRecordingService => "onvif-recording-service",
            StrategyKind::FtpListing => "ftp-listing",
            StrategyKind::HttpIndexListing => "http-index-listing",
            StrategyKind::MetadataUrl => "metadata-url",
            StrategyKind::HttpTemplates => "http-templates",
            StrategyKind::FtpTemplates => "ftp-templates",
            StrategyKind::RtspFallback => "rtsp-fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("authentication rejected by {target}")]
    AuthenticationFailure { target: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("{operation}: all strategies exhausted ({})", join_kinds(.attempted))]
    ExhaustedStrategies {
        operation: &'static str,
        attempted: Vec<StrategyKind>,
    },

    #[error("camera has no {0} capability")]
    CapabilityMissing(&'static str),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unknown camera: {0}")]
    UnknownCamera(String),
}

fn join_kinds(kinds: &[StrategyKind]) -> String {
    if kinds.is_empty() {
        return "none attempted".to_string();
    }
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CameraError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn auth(target: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            target: target.into(),
        }
    }

    pub fn exhausted(operation: &'static str, attempted: Vec<StrategyKind>) -> Self {
        Self::ExhaustedStrategies {
            operation,
            attempted,
        }
    }

    /// Stable reason code handed to the notification layer.
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::AuthenticationFailure { .. } => "authentication_failure",
            CameraError::MalformedInput(_) => "malformed_input",
            CameraError::ExhaustedStrategies { .. } => "exhausted_strategies",
            CameraError::CapabilityMissing(_) => "capability_missing",
            CameraError::InvalidCommand(_) => "invalid_command",
            CameraError::UnknownCamera(_) => "unknown_camera",
        }
    }
}

pub type CameraResult<T> = Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_lists_attempted_categories() {
        let err = CameraError::exhausted(
            "download_recording",
            vec![StrategyKind::MetadataUrl, StrategyKind::HttpTemplates, StrategyKind::FtpTemplates],
        );
        let text = err.to_string();
        assert!(text.contains("metadata-url, http-templates, ftp-templates"));
        assert_eq!(err.code(), "exhausted_strategies");
    }

    #[test]
    fn test_exhausted_with_nothing_attempted() {
        let err = CameraError::exhausted("search_recordings", vec![]);
        assert!(err.to_string().contains("none attempted"));
    }
}
