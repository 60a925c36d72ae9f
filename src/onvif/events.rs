use crate::camera::CameraClient;
use crate::onvif::soap::{SoapError, NS_EVENTS};
use crate::onvif::types::EventProperties;
use crate::onvif::xml::XmlNode;

pub struct EventsService;

impl EventsService {
    pub async fn get_event_properties(
        camera: &CameraClient,
        events_url: &str,
    ) -> Result<EventProperties, SoapError> {
        let request_body = format!(r#"<tev:GetEventProperties xmlns:tev="{}"/>"#, NS_EVENTS);
        let response = camera.send_soap_request(events_url, &request_body).await?;
        Ok(parse_event_properties(&response))
    }
}

pub fn parse_event_properties(response: &XmlNode) -> EventProperties {
    let mut topics = Vec::new();
    if let Some(set) = response.find("TopicSet") {
        let mut path = Vec::new();
        collect_topics(set, &mut path, &mut topics);
    }
    EventProperties { topics }
}

fn collect_topics<'a>(node: &'a XmlNode, path: &mut Vec<&'a str>, out: &mut Vec<String>) {
    for child in &node.children {
        // MessageDescription blocks describe payloads, not topics.
        if child.name == "MessageDescription" {
            continue;
        }
        path.push(child.name.as_str());
        if child.attr("topic") == Some("true") {
            out.push(path.join("/"));
        }
        collect_topics(child, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_paths_and_motion() {
        let xml = r#"<tev:GetEventPropertiesResponse xmlns:tev="e" xmlns:wstop="w" xmlns:tns1="t">
  <wstop:TopicSet>
    <tns1:RuleEngine>
      <CellMotionDetector>
        <Motion wstop:topic="true">
          <tt:MessageDescription><tt:Data><tt:SimpleItemDescription Name="IsMotion"/></tt:Data></tt:MessageDescription>
        </Motion>
      </CellMotionDetector>
    </tns1:RuleEngine>
    <tns1:Device><Trigger><DigitalInput wstop:topic="true"/></Trigger></tns1:Device>
  </wstop:TopicSet>
</tev:GetEventPropertiesResponse>"#;
        let props = parse_event_properties(&XmlNode::parse(xml).unwrap());
        assert_eq!(
            props.topics,
            vec!["RuleEngine/CellMotionDetector/Motion", "Device/Trigger/DigitalInput"]
        );
        assert!(props.has_motion_detection());
    }

    #[test]
    fn test_no_topic_set() {
        let props = parse_event_properties(&XmlNode::parse("<GetEventPropertiesResponse/>").unwrap());
        assert!(!props.has_motion_detection());
    }
}
