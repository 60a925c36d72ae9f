use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CameraError, CameraResult};

pub const MAX_MOVE_DURATION_MS: u64 = 60_000;
pub const MAX_PRESET: u16 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzDirection {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    ZoomIn,
    ZoomOut,
}

impl PtzDirection {
    pub fn is_zoom(&self) -> bool {
        matches!(self, PtzDirection::ZoomIn | PtzDirection::ZoomOut)
    }

    /// Unit pan/tilt/zoom vector; positive pan is right, positive tilt is up, positive
    /// zoom is tele.
    pub fn vector(&self) -> (f32, f32, f32) {
        match self {
            PtzDirection::Up => (0.0, 1.0, 0.0),
            PtzDirection::Down => (0.0, -1.0, 0.0),
            PtzDirection::Left => (-1.0, 0.0, 0.0),
            PtzDirection::Right => (1.0, 0.0, 0.0),
            PtzDirection::UpLeft => (-1.0, 1.0, 0.0),
            PtzDirection::UpRight => (1.0, 1.0, 0.0),
            PtzDirection::DownLeft => (-1.0, -1.0, 0.0),
            PtzDirection::DownRight => (1.0, -1.0, 0.0),
            PtzDirection::ZoomIn => (0.0, 0.0, 1.0),
            PtzDirection::ZoomOut => (0.0, 0.0, -1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzAction {
    Move,
    Zoom,
    Stop,
    GotoPreset,
    SetPreset,
    Home,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzBackendKind {
    Onvif,
    /// Dahua and Amcrest `ptz.cgi`.
    Dahua,
    /// Hikvision ISAPI.
    Hikvision,
    /// Reolink `api.cgi` JSON.
    Reolink,
    /// Pelco-D frames over a raw TCP serial bridge.
    PelcoD,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzCommand {
    pub action: PtzAction,
    #[serde(default)]
    pub direction: Option<PtzDirection>,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub preset: Option<u16>,
    /// Timed move: a Stop is issued after this many milliseconds.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

fn default_speed() -> f32 {
    0.5
}

/// One wire-level operation a command expands into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzStep {
    Move {
        direction: PtzDirection,
        speed: f32,
    },
    Stop {
        direction: Option<PtzDirection>,
    },
    Wait(Duration),
    GotoPreset(u16),
    SetPreset(u16),
    Home,
}

impl PtzCommand {
    pub fn movement(direction: PtzDirection, speed: f32) -> Self {
        Self {
            action: if direction.is_zoom() {
                PtzAction::Zoom
            } else {
                PtzAction::Move
            },
            direction: Some(direction),
            speed,
            preset: None,
            duration_ms: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            action: PtzAction::Stop,
            direction: None,
            speed: default_speed(),
            preset: None,
            duration_ms: None,
        }
    }

    pub fn preset(action: PtzAction, preset: u16) -> Self {
        Self {
            action,
            direction: None,
            speed: default_speed(),
            preset: Some(preset),
            duration_ms: None,
        }
    }

    pub fn for_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Local validation; an invalid command never reaches the network.
    pub fn validate(&self) -> CameraResult<()> {
        let invalid = |msg: String| Err(CameraError::InvalidCommand(msg));
        match self.action {
            PtzAction::Move | PtzAction::Zoom => {
                let Some(direction) = self.direction else {
                    return invalid(format!("{:?} requires a direction", self.action));
                };
                if self.action == PtzAction::Zoom && !direction.is_zoom() {
                    return invalid(format!("zoom requires zoom_in or zoom_out, got {:?}", direction));
                }
                if self.action == PtzAction::Move && direction.is_zoom() {
                    return invalid(format!("move requires a pan/tilt direction, got {:?}", direction));
                }
                if !self.speed.is_finite() || self.speed <= 0.0 || self.speed > 1.0 {
                    return invalid(format!("speed {} outside (0, 1]", self.speed));
                }
                if let Some(ms) = self.duration_ms {
                    if ms == 0 || ms > MAX_MOVE_DURATION_MS {
                        return invalid(format!("duration {}ms outside 1..={}", ms, MAX_MOVE_DURATION_MS));
                    }
                }
            }
            PtzAction::GotoPreset | PtzAction::SetPreset => match self.preset {
                Some(p) if (1..=MAX_PRESET).contains(&p) => {}
                Some(p) => return invalid(format!("preset {} outside 1..={}", p, MAX_PRESET)),
                None => return invalid(format!("{:?} requires a preset", self.action)),
            },
            PtzAction::Stop | PtzAction::Home => {}
        }
        if self.direction.is_some() && !matches!(self.action, PtzAction::Move | PtzAction::Zoom) {
            return invalid(format!("{:?} takes no direction", self.action));
        }
        Ok(())
    }

    /// Wire steps in execution order. Call after [`PtzCommand::validate`].
    pub fn steps(&self) -> Vec<PtzStep> {
        match (self.action, self.direction, self.preset) {
            (PtzAction::Move | PtzAction::Zoom, Some(direction), _) => {
                let mut steps = vec![PtzStep::Move {
                    direction,
                    speed: self.speed,
                }];
                if let Some(ms) = self.duration_ms {
                    steps.push(PtzStep::Wait(Duration::from_millis(ms)));
                    steps.push(PtzStep::Stop {
                        direction: Some(direction),
                    });
                }
                steps
            }
            (PtzAction::GotoPreset, _, Some(p)) => vec![PtzStep::GotoPreset(p)],
            (PtzAction::SetPreset, _, Some(p)) => vec![PtzStep::SetPreset(p)],
            (PtzAction::Home, _, _) => vec![PtzStep::Home],
            _ => vec![PtzStep::Stop { direction: None }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_requires_zoom_direction() {
        let mut cmd = PtzCommand::movement(PtzDirection::ZoomIn, 0.5);
        assert!(cmd.validate().is_ok());
        cmd.direction = Some(PtzDirection::Left);
        assert!(matches!(cmd.validate(), Err(CameraError::InvalidCommand(_))));

        let mut pan = PtzCommand::movement(PtzDirection::Left, 0.5);
        pan.direction = Some(PtzDirection::ZoomOut);
        assert!(pan.validate().is_err());
    }

    #[test]
    fn test_speed_and_duration_bounds() {
        assert!(PtzCommand::movement(PtzDirection::Up, 0.0).validate().is_err());
        assert!(PtzCommand::movement(PtzDirection::Up, 1.5).validate().is_err());
        assert!(PtzCommand::movement(PtzDirection::Up, f32::NAN).validate().is_err());
        assert!(PtzCommand::movement(PtzDirection::Up, 1.0).validate().is_ok());
        assert!(PtzCommand::movement(PtzDirection::Up, 0.3)
            .for_duration(MAX_MOVE_DURATION_MS + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_preset_bounds() {
        assert!(PtzCommand::preset(PtzAction::GotoPreset, 0).validate().is_err());
        assert!(PtzCommand::preset(PtzAction::SetPreset, 256).validate().is_err());
        assert!(PtzCommand::preset(PtzAction::GotoPreset, 3).validate().is_ok());
        let missing = PtzCommand {
            preset: None,
            ..PtzCommand::preset(PtzAction::GotoPreset, 1)
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_timed_move_ends_with_stop() {
        let steps = PtzCommand::movement(PtzDirection::Right, 0.4).for_duration(500).steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], PtzStep::Wait(Duration::from_millis(500)));
        assert!(matches!(steps[2], PtzStep::Stop { direction: Some(PtzDirection::Right) }));
    }

    #[test]
    fn test_command_from_json() {
        let cmd: PtzCommand =
            serde_json::from_str(r#"{"action":"zoom","direction":"zoom_out","duration_ms":300}"#).unwrap();
        assert_eq!(cmd.speed, 0.5);
        assert!(cmd.validate().is_ok());
    }
}
