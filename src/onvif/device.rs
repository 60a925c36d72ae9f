use chrono::{DateTime, TimeZone, Utc};

use crate::camera::types::OnvifServiceMap;
use crate::camera::CameraClient;
use crate::onvif::quirks::normalize_xaddr;
use crate::onvif::soap::{self, SoapError, NS_DEVICE};
use crate::onvif::types::{DeviceInformation, ServiceEntry};
use crate::onvif::xml::XmlNode;

pub struct DeviceService;

impl DeviceService {
    /// Unauthenticated, so it works before the clock offset is known.
    pub async fn get_system_date_and_time(camera: &CameraClient) -> Result<DateTime<Utc>, SoapError> {
        let response = camera
            .send_soap_request_no_auth(&camera.device_service_url(), soap::GET_SYSTEM_DATE_AND_TIME)
            .await?;
        parse_system_date_and_time(&response)
            .ok_or_else(|| SoapError::Parse("no usable date in GetSystemDateAndTime".to_string()))
    }

    pub async fn get_device_information(camera: &CameraClient) -> Result<DeviceInformation, SoapError> {
        let request_body = format!(r#"<tds:GetDeviceInformation xmlns:tds="{}"/>"#, NS_DEVICE);
        let response = camera
            .send_soap_request(&camera.device_service_url(), &request_body)
            .await?;
        Ok(parse_device_information(&response))
    }

    pub async fn get_capabilities(camera: &CameraClient) -> Result<OnvifServiceMap, SoapError> {
        let request_body = format!(
            r#"<tds:GetCapabilities xmlns:tds="{}"><tds:Category>All</tds:Category></tds:GetCapabilities>"#,
            NS_DEVICE
        );
        let response = camera
            .send_soap_request(&camera.device_service_url(), &request_body)
            .await?;
        Ok(parse_capabilities(&response, camera))
    }

    pub async fn get_services(camera: &CameraClient) -> Result<Vec<ServiceEntry>, SoapError> {
        let request_body = format!(
            r#"<tds:GetServices xmlns:tds="{}"><tds:IncludeCapability>false</tds:IncludeCapability></tds:GetServices>"#,
            NS_DEVICE
        );
        let response = camera
            .send_soap_request(&camera.device_service_url(), &request_body)
            .await?;
        Ok(parse_services(&response, camera))
    }
}

pub fn parse_system_date_and_time(response: &XmlNode) -> Option<DateTime<Utc>> {
    let info = response.find("SystemDateAndTime")?;
    // Devices without a UTC block only expose local time; close enough for token freshness.
    let stamp = info.child("UTCDateTime").or_else(|| info.child("LocalDateTime"))?;
    let date = stamp.child("Date")?;
    let time = stamp.child("Time")?;
    let num = |node: &XmlNode, name: &str| -> Option<u32> { node.text_of(name)?.parse().ok() };

    Utc.with_ymd_and_hms(
        num(date, "Year")? as i32,
        num(date, "Month")?,
        num(date, "Day")?,
        num(time, "Hour")?,
        num(time, "Minute")?,
        num(time, "Second")?,
    )
    .single()
}

pub fn parse_device_information(response: &XmlNode) -> DeviceInformation {
    let text = |name: &str| response.text_of(name).unwrap_or_default().to_string();
    DeviceInformation {
        manufacturer: text("Manufacturer"),
        model: text("Model"),
        firmware_version: text("FirmwareVersion"),
        serial_number: text("SerialNumber"),
        hardware_id: text("HardwareId"),
    }
}

fn xaddr_under(caps: &XmlNode, category: &str, camera: &CameraClient) -> Option<String> {
    let node = caps
        .child(category)
        .or_else(|| caps.child("Extension").and_then(|ext| ext.child(category)))?;
    let raw = node.text_of("XAddr")?;
    normalize_xaddr(raw, camera.endpoint(), &camera.base_url())
}

pub fn parse_capabilities(response: &XmlNode, camera: &CameraClient) -> OnvifServiceMap {
    let Some(caps) = response.find("Capabilities") else {
        return OnvifServiceMap::default();
    };
    OnvifServiceMap {
        device: xaddr_under(caps, "Device", camera),
        media: xaddr_under(caps, "Media", camera),
        ptz: xaddr_under(caps, "PTZ", camera),
        events: xaddr_under(caps, "Events", camera),
        imaging: xaddr_under(caps, "Imaging", camera),
        recording: xaddr_under(caps, "Recording", camera),
        search: xaddr_under(caps, "Search", camera),
        replay: xaddr_under(caps, "Replay", camera),
    }
}

pub fn parse_services(response: &XmlNode, camera: &CameraClient) -> Vec<ServiceEntry> {
    response
        .find_all("Service")
        .into_iter()
        .filter_map(|service| {
            let namespace = service.text_of("Namespace")?.to_string();
            let raw = service.text_of("XAddr")?;
            let xaddr = normalize_xaddr(raw, camera.endpoint(), &camera.base_url())?;
            let version = service.child("Version").and_then(|v| {
                Some((v.text_of("Major")?.parse().ok()?, v.text_of("Minor")?.parse().ok()?))
            });
            Some(ServiceEntry {
                namespace,
                xaddr,
                version,
            })
        })
        .collect()
}

/// Fills gaps in `map` from `GetServices` entries, keyed by service namespace.
pub fn merge_services(map: &mut OnvifServiceMap, entries: &[ServiceEntry]) {
    for entry in entries {
        let slot = match entry.namespace.as_str() {
            soap::NS_DEVICE => &mut map.device,
            soap::NS_MEDIA | "http://www.onvif.org/ver20/media/wsdl" => &mut map.media,
            soap::NS_PTZ => &mut map.ptz,
            soap::NS_EVENTS => &mut map.events,
            soap::NS_IMAGING => &mut map.imaging,
            soap::NS_RECORDING => &mut map.recording,
            soap::NS_SEARCH => &mut map.search,
            soap::NS_REPLAY => &mut map.replay,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(entry.xaddr.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::endpoint::CameraEndpoint;
    use crate::probe::{HttpClients, TlsPolicy};
    use std::time::Duration;

    fn camera() -> CameraClient {
        CameraClient::new(
            CameraEndpoint::new("203.0.113.7", 80).unwrap(),
            HttpClients::new(TlsPolicy::default()).unwrap(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_parse_capabilities_with_extension() {
        let xml = r#"<tds:GetCapabilitiesResponse xmlns:tds="d" xmlns:tt="s"><tds:Capabilities>
            <tt:Device><tt:XAddr>http://192.168.1.50/onvif/device_service</tt:XAddr></tt:Device>
            <tt:Media><tt:XAddr>http://192.168.1.50/onvif/Media</tt:XAddr></tt:Media>
            <tt:PTZ><tt:XAddr>http://192.168.1.50/onvif/PTZ</tt:XAddr></tt:PTZ>
            <tt:Extension>
                <tt:Search><tt:XAddr>http://192.168.1.50/onvif/SearchRecording</tt:XAddr></tt:Search>
                <tt:Replay><tt:XAddr>http://192.168.1.50/onvif/Replay</tt:XAddr></tt:Replay>
            </tt:Extension>
        </tds:Capabilities></tds:GetCapabilitiesResponse>"#;
        let node = XmlNode::parse(xml).unwrap();
        let map = parse_capabilities(&node, &camera());
        assert_eq!(map.media.as_deref(), Some("http://203.0.113.7/onvif/Media"));
        assert_eq!(map.search.as_deref(), Some("http://203.0.113.7/onvif/SearchRecording"));
        assert!(map.recording.is_none());
        assert!(map.events.is_none());
    }

    #[test]
    fn test_merge_services_fills_gaps_only() {
        let xml = r#"<GetServicesResponse>
            <Service><Namespace>http://www.onvif.org/ver10/recording/wsdl</Namespace><XAddr>http://203.0.113.7/onvif/Recording</XAddr><Version><Major>2</Major><Minor>40</Minor></Version></Service>
            <Service><Namespace>http://www.onvif.org/ver10/media/wsdl</Namespace><XAddr>http://203.0.113.7/other/media</XAddr></Service>
            <Service><Namespace>urn:vendor</Namespace><XAddr>http://203.0.113.7/v</XAddr></Service>
        </GetServicesResponse>"#;
        let entries = parse_services(&XmlNode::parse(xml).unwrap(), &camera());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].version, Some((2, 40)));

        let mut map = OnvifServiceMap {
            media: Some("http://203.0.113.7/onvif/Media".into()),
            ..Default::default()
        };
        merge_services(&mut map, &entries);
        assert_eq!(map.media.as_deref(), Some("http://203.0.113.7/onvif/Media"));
        assert_eq!(map.recording.as_deref(), Some("http://203.0.113.7/onvif/Recording"));
    }

    #[test]
    fn test_parse_system_date_and_time() {
        let xml = r#"<GetSystemDateAndTimeResponse><SystemDateAndTime>
            <DateTimeType>NTP</DateTimeType>
            <UTCDateTime><Time><Hour>9</Hour><Minute>5</Minute><Second>30</Second></Time>
            <Date><Year>2026</Year><Month>3</Month><Day>1</Day></Date></UTCDateTime>
        </SystemDateAndTime></GetSystemDateAndTimeResponse>"#;
        let ts = parse_system_date_and_time(&XmlNode::parse(xml).unwrap()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T09:05:30+00:00");
    }

    #[test]
    fn test_device_information_missing_fields_are_empty() {
        let xml = "<GetDeviceInformationResponse><Manufacturer>Hikvision</Manufacturer><Model>DS-2CD2043</Model></GetDeviceInformationResponse>";
        let info = parse_device_information(&XmlNode::parse(xml).unwrap());
        assert_eq!(info.manufacturer, "Hikvision");
        assert!(info.serial_number.is_empty());
    }
}
