use serde::{Deserialize, Serialize};

pub const HTTP_PORTS: &[u16] = &[80, 8080, 8000, 8899, 81, 88, 443, 8081, 8443];
pub const RTSP_PORTS: &[u16] = &[554, 8554, 1935, 7001, 5554, 8000, 8080];
pub const ONVIF_PORTS: &[u16] = &[80, 8080, 8000, 8899, 2020, 5000, 6688, 10080, 888];
pub const PROPRIETARY_PORTS: &[u16] = &[8000, 37777, 34567, 9000, 6036, 5000];
pub const FTP_PORTS: &[u16] = &[21, 2121];

/// Ports that only turn up on camera firmware (SDK / private control channels).
const CAMERA_EXCLUSIVE_PORTS: &[u16] = &[8000, 37777, 37778, 34567, 9000, 6036, 54321, 7001];
const RTSP_PRIORITY_PORTS: &[u16] = &[554, 8554];
const GENERIC_WEB_PORTS: &[u16] = &[8080, 8081, 443, 8443, 81, 88];

/// Scoring weights used by [`dynamic_priority_ports`]. The values are tunable; only the
/// relative order they produce matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortWeights {
    pub rtsp_priority: f32,
    pub camera_exclusive: f32,
    pub onvif: f32,
    pub generic_web: f32,
    pub port_80: f32,
}

impl Default for PortWeights {
    fn default() -> Self {
        Self {
            rtsp_priority: 10.0,
            camera_exclusive: 8.0,
            onvif: 6.0,
            generic_web: 3.0,
            port_80: -5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTable {
    pub http: Vec<u16>,
    pub rtsp: Vec<u16>,
    pub onvif: Vec<u16>,
    pub proprietary: Vec<u16>,
}

impl PortTable {
    fn from_slices(http: &[u16], rtsp: &[u16], onvif: &[u16], proprietary: &[u16]) -> Self {
        Self {
            http: http.to_vec(),
            rtsp: rtsp.to_vec(),
            onvif: onvif.to_vec(),
            proprietary: proprietary.to_vec(),
        }
    }

    pub fn generic() -> Self {
        Self::from_slices(HTTP_PORTS, RTSP_PORTS, ONVIF_PORTS, PROPRIETARY_PORTS)
    }

    /// Vendor ports first, then the generic candidates the vendor table did not name.
    pub fn merged_with_generic(&self) -> Self {
        let generic = Self::generic();
        Self {
            http: union(&self.http, &generic.http),
            rtsp: union(&self.rtsp, &generic.rtsp),
            onvif: union(&self.onvif, &generic.onvif),
            proprietary: union(&self.proprietary, &generic.proprietary),
        }
    }

    pub fn all_ports(&self) -> Vec<u16> {
        let mut all = Vec::new();
        for list in [&self.rtsp, &self.proprietary, &self.onvif, &self.http] {
            all = union(&all, list);
        }
        all
    }
}

fn union(first: &[u16], second: &[u16]) -> Vec<u16> {
    let mut out: Vec<u16> = Vec::with_capacity(first.len() + second.len());
    for port in first.iter().chain(second.iter()) {
        if !out.contains(port) {
            out.push(*port);
        }
    }
    out
}

fn canonical_manufacturer(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.as_str() {
        "hik" | "hikvision digital" | "annke" => "hikvision".to_string(),
        "tplink" | "tp link" | "tapo" => "tp-link".to_string(),
        "mi" | "mijia" | "imilab" => "xiaomi".to_string(),
        _ => lowered,
    }
}

/// Per-manufacturer port table, keyed by lowercase manufacturer name. Unknown names get the
/// generic table.
pub fn manufacturer_ports(manufacturer: Option<&str>) -> PortTable {
    let key = manufacturer.map(canonical_manufacturer).unwrap_or_default();
    match key.as_str() {
        "hikvision" => PortTable::from_slices(&[80, 443], &[554], &[80], &[8000]),
        "dahua" => PortTable::from_slices(&[80, 443], &[554], &[80], &[37777, 37778]),
        "axis" => PortTable::from_slices(&[80, 443], &[554], &[80], &[]),
        "foscam" => PortTable::from_slices(&[88, 443], &[554, 88], &[888], &[]),
        "tp-link" => PortTable::from_slices(&[443, 80], &[554], &[2020], &[]),
        "xiaomi" => PortTable::from_slices(&[80], &[554, 8554], &[], &[54321]),
        "reolink" => PortTable::from_slices(&[80, 443], &[554], &[8000], &[9000]),
        "amcrest" => PortTable::from_slices(&[80, 443], &[554], &[80], &[37777]),
        _ => PortTable::generic(),
    }
}

pub fn is_known_manufacturer(manufacturer: &str) -> bool {
    matches!(
        canonical_manufacturer(manufacturer).as_str(),
        "hikvision" | "dahua" | "axis" | "foscam" | "tp-link" | "xiaomi" | "reolink" | "amcrest"
    )
}

pub fn port_score(port: u16, weights: &PortWeights) -> f32 {
    if port == 80 {
        weights.port_80
    } else if RTSP_PRIORITY_PORTS.contains(&port) {
        weights.rtsp_priority
    } else if CAMERA_EXCLUSIVE_PORTS.contains(&port) {
        weights.camera_exclusive
    } else if GENERIC_WEB_PORTS.contains(&port) {
        weights.generic_web
    } else if ONVIF_PORTS.contains(&port) {
        weights.onvif
    } else {
        0.0
    }
}

/// Orders `candidates` by descending score. Duplicates keep their first position, and
/// ties keep the original list order (the sort is stable).
pub fn dynamic_priority_ports(candidates: &[u16], weights: &PortWeights) -> Vec<u16> {
    let mut scored: Vec<(u16, f32)> = union(candidates, &[])
        .into_iter()
        .map(|p| (p, port_score(p, weights)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(p, _)| p).collect()
}

pub fn priority_threshold(weights: &PortWeights) -> f32 {
    weights.camera_exclusive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_is_deterministic() {
        let table = PortTable::generic();
        let weights = PortWeights::default();
        let first = dynamic_priority_ports(&table.all_ports(), &weights);
        for _ in 0..10 {
            assert_eq!(dynamic_priority_ports(&table.all_ports(), &weights), first);
        }
    }

    #[test]
    fn test_relative_order_of_categories() {
        let weights = PortWeights::default();
        let ordered = dynamic_priority_ports(&[80, 8080, 2020, 37777, 554], &weights);
        assert_eq!(ordered, vec![554, 37777, 2020, 8080, 80]);
    }

    #[test]
    fn test_ties_keep_original_position() {
        let weights = PortWeights::default();
        assert_eq!(dynamic_priority_ports(&[8554, 554], &weights), vec![8554, 554]);
        assert_eq!(dynamic_priority_ports(&[554, 8554], &weights), vec![554, 8554]);
    }

    #[test]
    fn test_port_80_sorts_last() {
        let weights = PortWeights::default();
        let ordered = dynamic_priority_ports(ONVIF_PORTS, &weights);
        assert_eq!(ordered.last(), Some(&80));
    }

    #[test]
    fn test_manufacturer_lookup_is_case_insensitive() {
        assert_eq!(manufacturer_ports(Some("HIKVISION")).proprietary, vec![8000]);
        assert_eq!(manufacturer_ports(Some("Tapo")).onvif, vec![2020]);
        assert_eq!(manufacturer_ports(Some("acme")), PortTable::generic());
        assert_eq!(manufacturer_ports(None), PortTable::generic());
    }

    #[test]
    fn test_merge_keeps_vendor_ports_first() {
        let merged = manufacturer_ports(Some("dahua")).merged_with_generic();
        assert_eq!(&merged.proprietary[..2], &[37777, 37778]);
        assert!(merged.proprietary.contains(&34567));
        let mut seen = merged.proprietary.clone();
        seen.dedup();
        assert_eq!(seen.len(), merged.proprietary.len());
    }
}
