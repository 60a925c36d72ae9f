//! ONVIF PTZ request bodies.

use crate::onvif::soap::{xml_escape, NS_PTZ, NS_SCHEMA};

pub fn continuous_move(profile_token: &str, pan: f32, tilt: f32, zoom: f32) -> String {
    format!(
        r#"<tptz:ContinuousMove xmlns:tptz="{ptz}">
  <tptz:ProfileToken>{token}</tptz:ProfileToken>
  <tptz:Velocity>
    <tt:PanTilt x="{pan}" y="{tilt}" xmlns:tt="{tt}"/>
    <tt:Zoom x="{zoom}" xmlns:tt="{tt}"/>
  </tptz:Velocity>
</tptz:ContinuousMove>"#,
        ptz = NS_PTZ,
        tt = NS_SCHEMA,
        token = xml_escape(profile_token),
        pan = pan,
        tilt = tilt,
        zoom = zoom
    )
}

pub fn stop(profile_token: &str, pan_tilt: bool, zoom: bool) -> String {
    format!(
        r#"<tptz:Stop xmlns:tptz="{}">
  <tptz:ProfileToken>{}</tptz:ProfileToken>
  <tptz:PanTilt>{}</tptz:PanTilt>
  <tptz:Zoom>{}</tptz:Zoom>
</tptz:Stop>"#,
        NS_PTZ,
        xml_escape(profile_token),
        pan_tilt,
        zoom
    )
}

pub fn goto_preset(profile_token: &str, preset: u16) -> String {
    format!(
        r#"<tptz:GotoPreset xmlns:tptz="{}">
  <tptz:ProfileToken>{}</tptz:ProfileToken>
  <tptz:PresetToken>{}</tptz:PresetToken>
</tptz:GotoPreset>"#,
        NS_PTZ,
        xml_escape(profile_token),
        preset
    )
}

pub fn set_preset(profile_token: &str, preset: u16) -> String {
    format!(
        r#"<tptz:SetPreset xmlns:tptz="{}">
  <tptz:ProfileToken>{}</tptz:ProfileToken>
  <tptz:PresetName>Preset {}</tptz:PresetName>
  <tptz:PresetToken>{}</tptz:PresetToken>
</tptz:SetPreset>"#,
        NS_PTZ,
        xml_escape(profile_token),
        preset,
        preset
    )
}

pub fn goto_home(profile_token: &str) -> String {
    format!(
        r#"<tptz:GotoHomePosition xmlns:tptz="{}">
  <tptz:ProfileToken>{}</tptz:ProfileToken>
</tptz:GotoHomePosition>"#,
        NS_PTZ,
        xml_escape(profile_token)
    )
}
