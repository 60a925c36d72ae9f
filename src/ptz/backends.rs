//! Pure request builders for each PTZ backend. Nothing here touches the network.

use serde_json::json;

use crate::error::{CameraError, CameraResult};
use crate::onvif::ptz as onvif_ptz;
use crate::ptz::command::{PtzBackendKind, PtzDirection, PtzStep};

#[derive(Debug, Clone, PartialEq)]
pub enum WireRequest {
    /// SOAP body for the ONVIF PTZ service; the envelope and security header are added
    /// when sending.
    Soap { url: String, body: String },
    HttpGet { url: String },
    HttpPut { url: String, body: String },
    HttpPostJson { url: String, body: serde_json::Value },
    Tcp { host: String, port: u16, frame: Vec<u8> },
}

/// Where and how to reach one camera's PTZ backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendTarget {
    pub kind: PtzBackendKind,
    /// `scheme://host:port` for HTTP backends.
    pub base_url: String,
    pub host: String,
    pub port: u16,
    /// 1-based channel.
    pub channel: u8,
    pub pelco_address: u8,
    pub onvif_ptz_url: Option<String>,
    pub profile_token: Option<String>,
}

fn unsupported(kind: PtzBackendKind, what: &str) -> CameraError {
    CameraError::InvalidCommand(format!("{} is not supported by the {:?} backend", what, kind))
}

pub fn build(target: &BackendTarget, step: &PtzStep) -> CameraResult<Option<WireRequest>> {
    let request = match step {
        PtzStep::Wait(_) => return Ok(None),
        _ => match target.kind {
            PtzBackendKind::Onvif => onvif(target, step)?,
            PtzBackendKind::Dahua => dahua(target, step)?,
            PtzBackendKind::Hikvision => hikvision(target, step)?,
            PtzBackendKind::Reolink => reolink(target, step)?,
            PtzBackendKind::PelcoD => pelco_d(target, step)?,
        },
    };
    Ok(Some(request))
}

fn onvif(target: &BackendTarget, step: &PtzStep) -> CameraResult<WireRequest> {
    let url = target
        .onvif_ptz_url
        .clone()
        .ok_or(CameraError::CapabilityMissing("onvif ptz service"))?;
    let token = target
        .profile_token
        .as_deref()
        .ok_or(CameraError::CapabilityMissing("onvif media profile"))?;

    let body = match *step {
        PtzStep::Move { direction, speed } => {
            let (pan, tilt, zoom) = direction.vector();
            onvif_ptz::continuous_move(token, pan * speed, tilt * speed, zoom * speed)
        }
        PtzStep::Stop { direction } => {
            let zoom_only = direction.map(|d| d.is_zoom());
            onvif_ptz::stop(token, zoom_only != Some(true), zoom_only != Some(false))
        }
        PtzStep::GotoPreset(p) => onvif_ptz::goto_preset(token, p),
        PtzStep::SetPreset(p) => onvif_ptz::set_preset(token, p),
        PtzStep::Home => onvif_ptz::goto_home(token),
        PtzStep::Wait(_) => return Err(unsupported(target.kind, "wait")),
    };
    Ok(WireRequest::Soap { url, body })
}

fn dahua_code(direction: PtzDirection) -> &'static str {
    match direction {
        PtzDirection::Up => "Up",
        PtzDirection::Down => "Down",
        PtzDirection::Left => "Left",
        PtzDirection::Right => "Right",
        PtzDirection::UpLeft => "LeftUp",
        PtzDirection::UpRight => "RightUp",
        PtzDirection::DownLeft => "LeftDown",
        PtzDirection::DownRight => "RightDown",
        PtzDirection::ZoomIn => "ZoomTele",
        PtzDirection::ZoomOut => "ZoomWide",
    }
}

/// Maps a (0, 1] speed onto an integer scale `1..=max`.
fn scaled(speed: f32, max: u8) -> u8 {
    ((speed * f32::from(max)).ceil() as u8).clamp(1, max)
}

fn dahua(target: &BackendTarget, step: &PtzStep) -> CameraResult<WireRequest> {
    // ptz.cgi channels are 0-based.
    let channel = target.channel.saturating_sub(1);
    let query = match *step {
        PtzStep::Move { direction, speed } => {
            let s = scaled(speed, 8);
            // Diagonal codes take vertical speed in arg1 and horizontal in arg2.
            let arg1 = if matches!(
                direction,
                PtzDirection::UpLeft | PtzDirection::UpRight | PtzDirection::DownLeft | PtzDirection::DownRight
            ) {
                s
            } else {
                0
            };
            format!(
                "action=start&channel={}&code={}&arg1={}&arg2={}&arg3=0",
                channel,
                dahua_code(direction),
                arg1,
                s
            )
        }
        PtzStep::Stop { direction } => format!(
            "action=stop&channel={}&code={}&arg1=0&arg2=0&arg3=0",
            channel,
            dahua_code(direction.unwrap_or(PtzDirection::Up))
        ),
        PtzStep::GotoPreset(p) => format!(
            "action=start&channel={}&code=GotoPreset&arg1=0&arg2={}&arg3=0",
            channel, p
        ),
        PtzStep::SetPreset(p) => format!(
            "action=start&channel={}&code=SetPreset&arg1=0&arg2={}&arg3=0",
            channel, p
        ),
        PtzStep::Home => return Err(unsupported(target.kind, "home position")),
        PtzStep::Wait(_) => return Err(unsupported(target.kind, "wait")),
    };
    Ok(WireRequest::HttpGet {
        url: format!("{}/cgi-bin/ptz.cgi?{}", target.base_url, query),
    })
}

fn hikvision(target: &BackendTarget, step: &PtzStep) -> CameraResult<WireRequest> {
    let channel_url = format!("{}/ISAPI/PTZCtrl/channels/{}", target.base_url, target.channel);
    let request = match *step {
        PtzStep::Move { direction, speed } => {
            let (pan, tilt, zoom) = direction.vector();
            let s = f32::from(scaled(speed, 100));
            WireRequest::HttpPut {
                url: format!("{}/continuous", channel_url),
                body: format!(
                    "<PTZData><pan>{}</pan><tilt>{}</tilt><zoom>{}</zoom></PTZData>",
                    (pan * s) as i32,
                    (tilt * s) as i32,
                    (zoom * s) as i32
                ),
            }
        }
        PtzStep::Stop { .. } => WireRequest::HttpPut {
            url: format!("{}/continuous", channel_url),
            body: "<PTZData><pan>0</pan><tilt>0</tilt><zoom>0</zoom></PTZData>".to_string(),
        },
        PtzStep::GotoPreset(p) => WireRequest::HttpPut {
            url: format!("{}/presets/{}/goto", channel_url, p),
            body: String::new(),
        },
        PtzStep::SetPreset(p) => WireRequest::HttpPut {
            url: format!("{}/presets/{}", channel_url, p),
            body: format!(
                "<PTZPreset><id>{}</id><presetName>Preset {}</presetName></PTZPreset>",
                p, p
            ),
        },
        PtzStep::Home => WireRequest::HttpPut {
            url: format!("{}/homeposition/goto", channel_url),
            body: String::new(),
        },
        PtzStep::Wait(_) => return Err(unsupported(target.kind, "wait")),
    };
    Ok(request)
}

fn reolink_op(direction: PtzDirection) -> &'static str {
    match direction {
        PtzDirection::Up => "Up",
        PtzDirection::Down => "Down",
        PtzDirection::Left => "Left",
        PtzDirection::Right => "Right",
        PtzDirection::UpLeft => "LeftUp",
        PtzDirection::UpRight => "RightUp",
        PtzDirection::DownLeft => "LeftDown",
        PtzDirection::DownRight => "RightDown",
        PtzDirection::ZoomIn => "ZoomInc",
        PtzDirection::ZoomOut => "ZoomDec",
    }
}

fn reolink(target: &BackendTarget, step: &PtzStep) -> CameraResult<WireRequest> {
    let channel = target.channel.saturating_sub(1);
    let (cmd, param) = match *step {
        PtzStep::Move { direction, speed } => (
            "PtzCtrl",
            json!({ "channel": channel, "op": reolink_op(direction), "speed": scaled(speed, 64) }),
        ),
        PtzStep::Stop { .. } => ("PtzCtrl", json!({ "channel": channel, "op": "Stop" })),
        PtzStep::GotoPreset(p) => (
            "PtzCtrl",
            json!({ "channel": channel, "op": "ToPos", "id": p, "speed": 32 }),
        ),
        PtzStep::SetPreset(p) => (
            "SetPtzPreset",
            json!({ "PtzPreset": { "channel": channel, "enable": 1, "id": p, "name": format!("Preset {}", p) } }),
        ),
        PtzStep::Home => return Err(unsupported(target.kind, "home position")),
        PtzStep::Wait(_) => return Err(unsupported(target.kind, "wait")),
    };
    Ok(WireRequest::HttpPostJson {
        url: format!("{}/api.cgi?cmd={}", target.base_url, cmd),
        body: json!([{ "cmd": cmd, "action": 0, "param": param }]),
    })
}

/// Pelco-D frame: sync, address, command 1, command 2, data 1, data 2, checksum.
pub fn pelco_d_frame(address: u8, cmd1: u8, cmd2: u8, data1: u8, data2: u8) -> Vec<u8> {
    let checksum = [address, cmd1, cmd2, data1, data2]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    vec![0xFF, address, cmd1, cmd2, data1, data2, checksum]
}

fn pelco_d(target: &BackendTarget, step: &PtzStep) -> CameraResult<WireRequest> {
    let addr = target.pelco_address;
    let frame = match *step {
        PtzStep::Move { direction, speed } => {
            let (pan, tilt, zoom) = direction.vector();
            let mut cmd2 = 0u8;
            if pan > 0.0 {
                cmd2 |= 0x02;
            }
            if pan < 0.0 {
                cmd2 |= 0x04;
            }
            if tilt > 0.0 {
                cmd2 |= 0x08;
            }
            if tilt < 0.0 {
                cmd2 |= 0x10;
            }
            if zoom > 0.0 {
                cmd2 |= 0x20;
            }
            if zoom < 0.0 {
                cmd2 |= 0x40;
            }
            let s = scaled(speed, 0x3F);
            let pan_speed = if pan != 0.0 { s } else { 0 };
            let tilt_speed = if tilt != 0.0 { s } else { 0 };
            pelco_d_frame(addr, 0x00, cmd2, pan_speed, tilt_speed)
        }
        PtzStep::Stop { .. } => pelco_d_frame(addr, 0x00, 0x00, 0x00, 0x00),
        PtzStep::SetPreset(p) => pelco_d_frame(addr, 0x00, 0x03, 0x00, preset_byte(p)?),
        PtzStep::GotoPreset(p) => pelco_d_frame(addr, 0x00, 0x07, 0x00, preset_byte(p)?),
        PtzStep::Home => return Err(unsupported(target.kind, "home position")),
        PtzStep::Wait(_) => return Err(unsupported(target.kind, "wait")),
    };
    Ok(WireRequest::Tcp {
        host: target.host.clone(),
        port: target.port,
        frame,
    })
}

fn preset_byte(preset: u16) -> CameraResult<u8> {
    u8::try_from(preset).map_err(|_| CameraError::InvalidCommand(format!("preset {} exceeds 255", preset)))
}
