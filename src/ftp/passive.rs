use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;

use crate::camera::endpoint::is_private_ip;

fn pasv_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})")
            .unwrap_or_else(|e| panic!("invalid PASV pattern: {}", e))
    })
}

fn epsv_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(([!-~])([!-~]?)([!-~]?)(\d{1,5})([!-~])\)")
            .unwrap_or_else(|e| panic!("invalid EPSV pattern: {}", e))
    })
}

/// Port from a `229 Entering Extended Passive Mode (|||port|)` reply.
pub fn parse_epsv(text: &str) -> Option<u16> {
    let caps = epsv_regex().captures(text)?;
    let delim = caps.get(1)?.as_str();
    // The three leading delimiters and the trailing one must agree; net-prt and
    // net-addr are empty in the form servers actually send.
    if caps.get(2)?.as_str() != delim || caps.get(3)?.as_str() != delim || caps.get(5)?.as_str() != delim {
        return None;
    }
    caps.get(4)?.as_str().parse::<u16>().ok().filter(|p| *p != 0)
}

/// Address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub fn parse_pasv(text: &str) -> Option<(Ipv4Addr, u16)> {
    let caps = pasv_regex().captures(text)?;
    let mut octets = [0u8; 6];
    for (i, slot) in octets.iter_mut().enumerate() {
        *slot = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = u16::from(octets[4]) << 8 | u16::from(octets[5]);
    (port != 0).then_some((ip, port))
}

/// Host to open the data channel against.
///
/// Embedded FTP servers behind NAT routinely advertise their internal address in PASV;
/// private, link-local, loopback and unspecified addresses are replaced by the host the
/// control connection reached.
pub fn data_host(reported: Ipv4Addr, control_host: &str) -> String {
    if is_private_ip(&IpAddr::V4(reported)) {
        if reported.to_string() != control_host {
            tracing::debug!(
                "PASV reported internal address {}, using control host {}",
                reported,
                control_host
            );
        }
        control_host.to_string()
    } else {
        reported.to_string()
    }
}
