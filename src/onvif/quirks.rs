use std::net::IpAddr;
use url::Url;

use crate::camera::endpoint::{is_private_ip, CameraEndpoint};

/// Normalises a device-reported service address so it is reachable from where we stand.
///
/// Handles the deviations seen in the field: several space-separated addresses, bare paths,
/// loopback or unspecified hosts, and NATed devices that report their LAN address.
pub fn normalize_xaddr(raw: &str, reached: &CameraEndpoint, base_url: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    if first.starts_with('/') {
        return Some(format!("{}{}", base_url.trim_end_matches('/'), first));
    }

    let mut url = Url::parse(first).ok()?;
    let reported = url.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
    if reported.eq_ignore_ascii_case(reached.host()) {
        return Some(url.to_string());
    }

    let local_only = reported.eq_ignore_ascii_case("localhost")
        || matches!(reported.parse::<IpAddr>(), Ok(ip) if is_local_only(&ip));
    let foreign_private = matches!(reported.parse::<IpAddr>(), Ok(ip) if is_private_ip(&ip));

    if local_only {
        url.set_host(Some(&reached.url_host())).ok()?;
        url.set_port(Some(reached.port())).ok()?;
        tracing::debug!("Rewrote local-only XAddr {} -> {}", first, url);
    } else if foreign_private {
        url.set_host(Some(&reached.url_host())).ok()?;
        tracing::debug!("Rewrote NATed XAddr {} -> {}", first, url);
    }
    Some(url.to_string())
}

fn is_local_only(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
