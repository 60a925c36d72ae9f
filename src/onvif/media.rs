use crate::camera::types::StreamProfile;
use crate::camera::CameraClient;
use crate::onvif::soap::{xml_escape, SoapError, NS_MEDIA, NS_SCHEMA};
use crate::onvif::types::StreamUri;
use crate::onvif::xml::XmlNode;

pub struct MediaService;

impl MediaService {
    pub async fn get_profiles(camera: &CameraClient, media_url: &str) -> Result<Vec<StreamProfile>, SoapError> {
        let request_body = format!(r#"<trt:GetProfiles xmlns:trt="{}"/>"#, NS_MEDIA);
        let response = camera.send_soap_request(media_url, &request_body).await?;
        Ok(parse_profiles(&response))
    }

    pub async fn get_stream_uri(
        camera: &CameraClient,
        media_url: &str,
        profile_token: &str,
        protocol: &str,
    ) -> Result<StreamUri, SoapError> {
        let request_body = format!(
            r#"<trt:GetStreamUri xmlns:trt="{}">
  <trt:StreamSetup>
    <tt:Stream xmlns:tt="{}">RTP-Unicast</tt:Stream>
    <tt:Transport xmlns:tt="{}">
      <tt:Protocol>{}</tt:Protocol>
    </tt:Transport>
  </trt:StreamSetup>
  <trt:ProfileToken>{}</trt:ProfileToken>
</trt:GetStreamUri>"#,
            NS_MEDIA,
            NS_SCHEMA,
            NS_SCHEMA,
            protocol,
            xml_escape(profile_token)
        );

        let response = camera.send_soap_request(media_url, &request_body).await?;
        parse_media_uri(&response)
            .ok_or_else(|| SoapError::Parse("GetStreamUri response without Uri".to_string()))
    }

    pub async fn get_snapshot_uri(
        camera: &CameraClient,
        media_url: &str,
        profile_token: &str,
    ) -> Result<StreamUri, SoapError> {
        let request_body = format!(
            r#"<trt:GetSnapshotUri xmlns:trt="{}">
  <trt:ProfileToken>{}</trt:ProfileToken>
</trt:GetSnapshotUri>"#,
            NS_MEDIA,
            xml_escape(profile_token)
        );

        let response = camera.send_soap_request(media_url, &request_body).await?;
        parse_media_uri(&response)
            .ok_or_else(|| SoapError::Parse("GetSnapshotUri response without Uri".to_string()))
    }
}

pub fn parse_profiles(response: &XmlNode) -> Vec<StreamProfile> {
    response
        .find_all("Profiles")
        .into_iter()
        .filter_map(|profile| {
            let token = profile.attr("token")?.to_string();
            let encoder = profile.child("VideoEncoderConfiguration");
            let resolution = encoder.and_then(|e| e.child("Resolution"));
            let dimension = |name: &str| {
                resolution
                    .and_then(|r| r.text_of(name))
                    .and_then(|v| v.parse::<u32>().ok())
            };
            Some(StreamProfile {
                name: profile.path_text(&["Name"]).unwrap_or(&token).to_string(),
                encoding: encoder.and_then(|e| e.text_of("Encoding")).map(str::to_string),
                width: dimension("Width"),
                height: dimension("Height"),
                has_audio: profile.child("AudioEncoderConfiguration").is_some(),
                has_ptz: profile.child("PTZConfiguration").is_some(),
                token,
            })
        })
        .collect()
}

fn parse_media_uri(response: &XmlNode) -> Option<StreamUri> {
    let media = response.find("MediaUri")?;
    Some(StreamUri {
        uri: media.text_of("Uri")?.to_string(),
        invalid_after_connect: media.bool_of("InvalidAfterConnect").unwrap_or(false),
        invalid_after_reboot: media.bool_of("InvalidAfterReboot").unwrap_or(false),
        timeout: media.text_of("Timeout").map(str::to_string),
    })
}
