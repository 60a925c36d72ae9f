use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::camera::types::RecordingDescriptor;
use crate::camera::CameraClient;
use crate::knowledge::paths::has_video_extension;
use crate::onvif::soap::{xml_escape, SoapError, NS_RECORDING, NS_REPLAY, NS_SCHEMA, NS_SEARCH};
use crate::onvif::types::SearchState;
use crate::onvif::xml::XmlNode;

const MAX_RESULT_ROUNDS: usize = 10;

/// Profile G search, recording and replay calls.
pub struct RecordingService;

impl RecordingService {
    pub async fn find_recordings(camera: &CameraClient, search_url: &str) -> Result<String, SoapError> {
        let request_body = format!(
            r#"<tse:FindRecordings xmlns:tse="{}">
  <tse:Scope/>
  <tse:MaxMatches>100</tse:MaxMatches>
  <tse:KeepAliveTime>PT60S</tse:KeepAliveTime>
</tse:FindRecordings>"#,
            NS_SEARCH
        );
        let response = camera.send_soap_request(search_url, &request_body).await?;
        response
            .text_of("SearchToken")
            .map(str::to_string)
            .ok_or_else(|| SoapError::Parse("FindRecordings response without SearchToken".to_string()))
    }

    pub async fn get_recording_search_results(
        camera: &CameraClient,
        search_url: &str,
        token: &str,
    ) -> Result<(Vec<RecordingDescriptor>, SearchState), SoapError> {
        let request_body = format!(
            r#"<tse:GetRecordingSearchResults xmlns:tse="{}">
  <tse:SearchToken>{}</tse:SearchToken>
  <tse:MinResults>1</tse:MinResults>
  <tse:MaxResults>100</tse:MaxResults>
  <tse:WaitTime>PT5S</tse:WaitTime>
</tse:GetRecordingSearchResults>"#,
            NS_SEARCH,
            xml_escape(token)
        );
        let response = camera.send_soap_request(search_url, &request_body).await?;
        Ok(parse_search_results(&response))
    }

    pub async fn end_search(camera: &CameraClient, search_url: &str, token: &str) -> Result<(), SoapError> {
        let request_body = format!(
            r#"<tse:EndSearch xmlns:tse="{}"><tse:SearchToken>{}</tse:SearchToken></tse:EndSearch>"#,
            NS_SEARCH,
            xml_escape(token)
        );
        camera.send_soap_request(search_url, &request_body).await?;
        Ok(())
    }

    /// Runs a whole FindRecordings session. Results keep the order the device reported them in.
    pub async fn search_all(camera: &CameraClient, search_url: &str) -> Result<Vec<RecordingDescriptor>, SoapError> {
        let token = Self::find_recordings(camera, search_url).await?;
        let mut recordings = Vec::new();
        let mut outcome = Ok(());

        for _ in 0..MAX_RESULT_ROUNDS {
            match Self::get_recording_search_results(camera, search_url, &token).await {
                Ok((batch, state)) => {
                    recordings.extend(batch);
                    if state == SearchState::Completed {
                        break;
                    }
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if let Err(e) = Self::end_search(camera, search_url, &token).await {
            tracing::debug!("EndSearch failed: {}", e);
        }
        outcome.map(|_| recordings)
    }

    pub async fn get_recordings(
        camera: &CameraClient,
        recording_url: &str,
    ) -> Result<Vec<RecordingDescriptor>, SoapError> {
        let request_body = format!(r#"<trc:GetRecordings xmlns:trc="{}"/>"#, NS_RECORDING);
        let response = camera.send_soap_request(recording_url, &request_body).await?;
        Ok(parse_recording_items(&response))
    }

    pub async fn get_replay_uri(
        camera: &CameraClient,
        replay_url: &str,
        recording_token: &str,
    ) -> Result<String, SoapError> {
        let request_body = format!(
            r#"<trp:GetReplayUri xmlns:trp="{}">
  <trp:StreamSetup>
    <tt:Stream xmlns:tt="{}">RTP-Unicast</tt:Stream>
    <tt:Transport xmlns:tt="{}"><tt:Protocol>RTSP</tt:Protocol></tt:Transport>
  </trp:StreamSetup>
  <trp:RecordingToken>{}</trp:RecordingToken>
</trp:GetReplayUri>"#,
            NS_REPLAY,
            NS_SCHEMA,
            NS_SCHEMA,
            xml_escape(recording_token)
        );
        let response = camera.send_soap_request(replay_url, &request_body).await?;
        response
            .text_of("Uri")
            .map(str::to_string)
            .ok_or_else(|| SoapError::Parse("GetReplayUri response without Uri".to_string()))
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn descriptor(token: &str, content: Option<&str>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> RecordingDescriptor {
    let mut metadata = HashMap::new();
    metadata.insert("recordingToken".to_string(), token.to_string());
    metadata.insert("source".to_string(), "onvif".to_string());
    if let Some(content) = content {
        metadata.insert("content".to_string(), content.to_string());
    }

    // Some NVRs put the file name in Content; otherwise the token is the best handle we have.
    let filename = content
        .filter(|c| has_video_extension(c))
        .unwrap_or(token)
        .to_string();

    let duration_secs = match (start, end) {
        (Some(s), Some(e)) if e >= s => u64::try_from((e - s).num_seconds()).ok(),
        _ => None,
    };

    RecordingDescriptor {
        id: token.to_string(),
        filename,
        start_time: start,
        end_time: end,
        duration_secs,
        metadata,
        ..Default::default()
    }
}

pub fn parse_search_results(response: &XmlNode) -> (Vec<RecordingDescriptor>, SearchState) {
    let state = response
        .text_of("SearchState")
        .map(SearchState::parse)
        .unwrap_or(SearchState::Unknown);

    let recordings = response
        .find_all("RecordingInformation")
        .into_iter()
        .filter_map(|info| {
            let token = info.text_of("RecordingToken")?;
            let mut rec = descriptor(
                token,
                info.path_text(&["Content"]),
                parse_time(info.text_of("EarliestRecording")),
                parse_time(info.text_of("LatestRecording")),
            );
            if let Some(status) = info.text_of("RecordingStatus") {
                rec.metadata.insert("status".to_string(), status.to_string());
            }
            if let Some(name) = info.child("Source").and_then(|s| s.text_of("Name")) {
                rec.metadata.insert("sourceName".to_string(), name.to_string());
            }
            Some(rec)
        })
        .collect();

    (recordings, state)
}

pub fn parse_recording_items(response: &XmlNode) -> Vec<RecordingDescriptor> {
    response
        .find_all("RecordingItem")
        .into_iter()
        .filter_map(|item| {
            let token = item.text_of("RecordingToken")?;
            let config = item.child("Configuration");
            Some(descriptor(
                token,
                config.and_then(|c| c.path_text(&["Content"])),
                None,
                None,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_results_keeps_device_order() {
        let xml = r#"<tse:GetRecordingSearchResultsResponse xmlns:tse="s" xmlns:tt="t"><tse:ResultList>
  <tt:SearchState>Completed</tt:SearchState>
  <tt:RecordingInformation>
    <tt:RecordingToken>rec-2</tt:RecordingToken>
    <tt:Source><tt:SourceId>src</tt:SourceId><tt:Name>Front door</tt:Name></tt:Source>
    <tt:EarliestRecording>2026-03-01T12:00:00Z</tt:EarliestRecording>
    <tt:LatestRecording>2026-03-01T12:10:00Z</tt:LatestRecording>
    <tt:Content>clip_20260301120000.mp4</tt:Content>
    <tt:RecordingStatus>Stopped</tt:RecordingStatus>
  </tt:RecordingInformation>
  <tt:RecordingInformation>
    <tt:RecordingToken>rec-1</tt:RecordingToken>
    <tt:EarliestRecording>2026-03-01T08:00:00Z</tt:EarliestRecording>
  </tt:RecordingInformation>
</tse:ResultList></tse:GetRecordingSearchResultsResponse>"#;
        let (recs, state) = parse_search_results(&XmlNode::parse(xml).unwrap());
        assert_eq!(state, SearchState::Completed);
        let ids: Vec<_> = recs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rec-2", "rec-1"]);
        assert_eq!(recs[0].filename, "clip_20260301120000.mp4");
        assert_eq!(recs[0].duration_secs, Some(600));
        assert_eq!(recs[0].metadata.get("sourceName").map(String::as_str), Some("Front door"));
        assert_eq!(recs[1].filename, "rec-1");
        assert!(recs[1].end_time.is_none());
    }

    #[test]
    fn test_parse_recording_items() {
        let xml = r#"<GetRecordingsResponse><RecordingItem><RecordingToken>R0</RecordingToken>
            <Configuration><Source><Name>cam</Name></Source><Content>Continuous</Content></Configuration>
        </RecordingItem></GetRecordingsResponse>"#;
        let recs = parse_recording_items(&XmlNode::parse(xml).unwrap());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].filename, "R0");
        assert_eq!(recs[0].metadata.get("content").map(String::as_str), Some("Continuous"));
    }
}
