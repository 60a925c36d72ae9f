//! WS-Discovery multicast probe for ONVIF NetworkVideoTransmitters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use url::Url;
use uuid::Uuid;

use crate::onvif::xml::XmlNode;

const MULTICAST_ADDR: &str = "239.255.255.250:3702";
const MAX_RESULTS: usize = 256;

const PROBE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
    <a:MessageID>uuid:{message_id}</a:MessageID>
    <a:ReplyTo>
      <a:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
    </a:ReplyTo>
    <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
  </s:Header>
  <s:Body>
    <Probe xmlns="http://schemas.xmlsoap.org/ws/2005/04/discovery">
      <d:Types xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dp0="http://www.onvif.org/ver10/network/wsdl">dp0:NetworkVideoTransmitter</d:Types>
    </Probe>
  </s:Body>
</s:Envelope>"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub device_service_url: String,
    pub xaddrs: Vec<String>,
    pub scopes: Vec<String>,
    pub types: Vec<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub source: Option<SocketAddr>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    /// Host and port of the advertised device service.
    pub fn service_host(&self) -> Option<(String, u16)> {
        let url = Url::parse(&self.device_service_url).ok()?;
        let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
        Some((host, url.port_or_known_default()?))
    }
}

pub fn probe_message(message_id: &str) -> String {
    PROBE_TEMPLATE.replace("{message_id}", message_id)
}

fn scope_value(scopes: &[String], key: &str) -> Option<String> {
    let marker = format!("/{}/", key);
    scopes.iter().find_map(|scope| {
        let pos = scope.find(&marker)?;
        let value = scope[pos + marker.len()..].split('/').next()?;
        let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();
        (!decoded.is_empty()).then_some(decoded)
    })
}

fn split_list(node: &XmlNode, name: &str) -> Vec<String> {
    node.text_of(name)
        .map(|t| t.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Parses a `ProbeMatches` reply. Replies without XAddrs are ignored.
pub fn parse_probe_match(xml: &str, source: Option<SocketAddr>) -> Option<DiscoveredDevice> {
    let root = XmlNode::parse(xml).ok()?;
    let matched = root.find("ProbeMatch")?;

    let xaddrs = split_list(matched, "XAddrs");
    let first = xaddrs.first()?.clone();
    let scopes = split_list(matched, "Scopes");
    let types = split_list(matched, "Types");

    Some(DiscoveredDevice {
        device_service_url: first,
        manufacturer: scope_value(&scopes, "mfr").or_else(|| scope_value(&scopes, "manufacturer")),
        model: scope_value(&scopes, "hardware"),
        name: scope_value(&scopes, "name"),
        location: scope_value(&scopes, "location"),
        xaddrs,
        scopes,
        types,
        source,
        discovered_at: Utc::now(),
    })
}

/// Sends one multicast probe and collects matches until `timeout` elapses.
pub async fn probe(timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind UDP socket")?;
    let target: SocketAddr = MULTICAST_ADDR.parse().context("Invalid multicast address")?;

    let message = probe_message(&Uuid::new_v4().to_string());
    socket
        .send_to(message.as_bytes(), target)
        .await
        .context("Failed to send WS-Discovery probe")?;
    tracing::debug!("WS-Discovery probe sent to {}", target);

    let deadline = tokio::time::Instant::now() + timeout;
    let mut devices: Vec<DiscoveredDevice> = Vec::new();
    let mut buffer = vec![0u8; 65_535];

    while devices.len() < MAX_RESULTS {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await;
        let (size, from) = match received {
            Err(_) => break,
            Ok(Err(e)) => {
                tracing::warn!("WS-Discovery receive failed: {}", e);
                break;
            }
            Ok(Ok(r)) => r,
        };
        let reply = String::from_utf8_lossy(&buffer[..size]);
        match parse_probe_match(&reply, Some(from)) {
            Some(device) if !devices.iter().any(|d| d.device_service_url == device.device_service_url) => {
                tracing::info!("WS-Discovery: {} at {}", device.device_service_url, from);
                devices.push(device);
            }
            Some(_) => {}
            None => tracing::trace!("Ignoring non-ProbeMatch datagram from {}", from),
        }
    }

    tracing::info!("WS-Discovery found {} devices", devices.len());
    Ok(devices)
}
