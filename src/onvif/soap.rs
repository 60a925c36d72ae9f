use thiserror::Error;

use crate::onvif::xml::XmlNode;

pub const CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

pub const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const NS_EVENTS: &str = "http://www.onvif.org/ver10/events/wsdl";
pub const NS_PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const NS_IMAGING: &str = "http://www.onvif.org/ver20/imaging/wsdl";
pub const NS_RECORDING: &str = "http://www.onvif.org/ver10/recording/wsdl";
pub const NS_SEARCH: &str = "http://www.onvif.org/ver10/search/wsdl";
pub const NS_REPLAY: &str = "http://www.onvif.org/ver10/replay/wsdl";
pub const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

pub const GET_SYSTEM_DATE_AND_TIME: &str =
    r#"<tds:GetSystemDateAndTime xmlns:tds="http://www.onvif.org/ver10/device/wsdl"/>"#;

/// Wraps `body` in a SOAP 1.2 envelope, with an optional WS-Security header block.
pub fn envelope(security_header: Option<&str>, body: &str) -> String {
    let header = match security_header {
        Some(security) => format!("<SOAP-ENV:Header>\n{}\n</SOAP-ENV:Header>\n", security),
        None => String::new(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="{}" xmlns:trt="{}" xmlns:tt="{}">
{}<SOAP-ENV:Body>
{}
</SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        NS_DEVICE, NS_MEDIA, NS_SCHEMA, header, body
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SoapFault {
    pub code: String,
    pub subcode: Option<String>,
    pub reason: String,
}

impl SoapFault {
    fn from_node(fault: &XmlNode) -> Self {
        // SOAP 1.2 nests Code/Value and Code/Subcode/Value; SOAP 1.1 uses faultcode/faultstring.
        let code = fault
            .child("Code")
            .and_then(|c| c.path_text(&["Value"]))
            .or_else(|| fault.text_of("faultcode"))
            .unwrap_or_default()
            .to_string();
        let subcode = fault
            .child("Code")
            .and_then(|c| c.child("Subcode"))
            .and_then(|s| s.text_of("Value"))
            .map(str::to_string);
        let reason = fault
            .child("Reason")
            .and_then(|r| r.text_of("Text"))
            .or_else(|| fault.text_of("faultstring"))
            .unwrap_or_default()
            .to_string();
        Self {
            code,
            subcode,
            reason,
        }
    }

    pub fn is_not_authorized(&self) -> bool {
        let sub = self.subcode.as_deref().unwrap_or_default();
        sub.contains("NotAuthorized")
            || self.code.contains("NotAuthorized")
            || self.reason.to_ascii_lowercase().contains("not authorized")
    }

    /// The device does not implement the requested operation or service.
    pub fn is_unsupported(&self) -> bool {
        let sub = self.subcode.as_deref().unwrap_or_default();
        ["ActionNotSupported", "NoSuchService", "InvalidArgVal", "NotSupported"]
            .iter()
            .any(|marker| sub.contains(marker) || self.code.contains(marker))
    }
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subcode {
            Some(sub) => write!(f, "{} / {}: {}", self.code, sub, self.reason),
            None => write!(f, "{}: {}", self.code, self.reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("device rejected credentials")]
    Unauthorized,

    #[error("SOAP fault {0}")]
    Fault(SoapFault),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("unparseable response: {0}")]
    Parse(String),
}

impl SoapError {
    pub fn is_auth(&self) -> bool {
        match self {
            SoapError::Unauthorized => true,
            SoapError::Fault(fault) => fault.is_not_authorized(),
            _ => false,
        }
    }

    /// The service answered, so the endpoint speaks SOAP even though this call failed.
    pub fn device_answered(&self) -> bool {
        matches!(self, SoapError::Fault(_) | SoapError::Unauthorized)
    }
}

#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub header: Option<XmlNode>,
    pub body: XmlNode,
}

impl SoapEnvelope {
    pub fn parse(xml: &str) -> Result<Self, SoapError> {
        let root = XmlNode::parse(xml).map_err(SoapError::Parse)?;
        if root.name != "Envelope" {
            return Err(SoapError::Parse(format!("root element is {}", root.name)));
        }
        let body = root
            .child("Body")
            .cloned()
            .ok_or_else(|| SoapError::Parse("SOAP Body not found".to_string()))?;
        Ok(Self {
            header: root.child("Header").cloned(),
            body,
        })
    }

    /// Name of the first element in the Body, e.g. `GetProfilesResponse`.
    pub fn action(&self) -> &str {
        self.body
            .children
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or_default()
    }

    pub fn fault(&self) -> Option<SoapFault> {
        self.body.child("Fault").map(SoapFault::from_node)
    }

    /// The response payload, or the fault the device returned instead.
    pub fn into_payload(self) -> Result<XmlNode, SoapError> {
        if let Some(fault) = self.fault() {
            return Err(SoapError::Fault(fault));
        }
        let mut body = self.body;
        if body.children.is_empty() {
            // Some firmwares answer set-style operations with an empty Body.
            return Ok(XmlNode::default());
        }
        Ok(body.children.swap_remove(0))
    }
}

/// Parses a raw SOAP response straight into its payload element.
pub fn parse_response(xml: &str) -> Result<XmlNode, SoapError> {
    SoapEnvelope::parse(xml)?.into_payload()
}

pub fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
