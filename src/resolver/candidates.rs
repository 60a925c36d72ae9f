//! Candidate URL generation. Every function here is pure and returns lists without
//! duplicates, first occurrence winning.

use url::Url;

use crate::camera::endpoint::{url_host, Credentials};
use crate::camera::types::{ProtocolDetectionResult, ProtocolKind, RecordingDescriptor};
use crate::camera::CameraConfig;
use crate::error::{CameraError, CameraResult};
use crate::knowledge::paths::{
    fill_template, has_video_extension, PATH_KEYS, PLAYBACK_URL_KEYS, RECORDING_PATH_TEMPLATES,
    RTSP_FALLBACK_PATHS, RTSP_PATH_TEMPLATES,
};
use crate::knowledge::ports::{FTP_PORTS, HTTP_PORTS};

pub fn dedup<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Absolute URLs stored in the metadata bag under `keys`, in key order.
pub fn metadata_urls(recording: &RecordingDescriptor, keys: &[&str]) -> Vec<Url> {
    dedup(keys.iter().filter_map(|key| {
        let raw = recording.metadata.get(*key)?.trim();
        match Url::parse(raw) {
            Ok(url) if url.host_str().is_some() => Some(url),
            Ok(_) => None,
            Err(e) => {
                if !raw.starts_with('/') {
                    tracing::debug!("Ignoring metadata {}={:?}: {}", key, raw, e);
                }
                None
            }
        }
    }))
}

/// Metadata playback URLs, then the thumbnail field when it actually points at a video.
pub fn playback_metadata_urls(recording: &RecordingDescriptor) -> Vec<Url> {
    let mut urls = metadata_urls(recording, PLAYBACK_URL_KEYS);
    if let Some(thumb) = recording.thumbnail_url.as_deref() {
        if has_video_extension(thumb) {
            if let Ok(url) = Url::parse(thumb) {
                urls.push(url);
            }
        }
    }
    dedup(urls)
}

/// Device-relative paths supplied by metadata: explicit path keys plus URL fields that hold
/// a bare path.
pub fn metadata_paths(recording: &RecordingDescriptor) -> Vec<String> {
    let keys = PATH_KEYS.iter().chain(PLAYBACK_URL_KEYS.iter());
    dedup(keys.filter_map(|key| {
        let raw = recording.metadata.get(*key)?.trim();
        if raw.starts_with('/') && !raw.starts_with("//") {
            Some(raw.to_string())
        } else if PATH_KEYS.contains(key) && !raw.is_empty() && !raw.contains("://") {
            Some(format!("/{}", raw))
        } else {
            None
        }
    }))
}

/// Recording file paths to try on any base: metadata paths, then the vendor templates.
pub fn recording_paths(recording: &RecordingDescriptor) -> Vec<String> {
    let mut paths = metadata_paths(recording);
    let filename = recording.filename.trim();
    if !filename.is_empty() {
        paths.extend(
            RECORDING_PATH_TEMPLATES
                .iter()
                .map(|t| fill_template(t, filename)),
        );
    }
    dedup(paths)
}

/// Recording paths followed by the live-stream templates that many firmwares also serve
/// over HTTP.
pub fn playback_paths(recording: &RecordingDescriptor) -> Vec<String> {
    let mut paths = recording_paths(recording);
    paths.extend(RTSP_PATH_TEMPLATES.iter().map(|p| p.to_string()));
    dedup(paths)
}

fn scheme_for_port(port: u16) -> &'static str {
    if port == 443 || port == 8443 {
        "https"
    } else {
        "http"
    }
}

fn base_url(scheme: &str, host: &str, port: u16) -> CameraResult<Url> {
    let raw = format!("{}://{}:{}/", scheme, url_host(host), port);
    Url::parse(&raw).map_err(|e| CameraError::malformed(format!("{}: {}", raw, e)))
}

/// The stream URL with an `rtsp` scheme swapped for `http`, keeping only the host. The RTSP
/// port never serves HTTP, so the default port is used.
pub fn rtsp_to_http_base(stream: &Url) -> Option<Url> {
    let host = stream.host_str()?;
    match stream.scheme() {
        "rtsp" | "rtsps" => {
            let scheme = if stream.scheme() == "rtsps" { "https" } else { "http" };
            Url::parse(&format!("{}://{}/", scheme, host)).ok()
        }
        "http" | "https" => {
            let mut origin = stream.clone();
            origin.set_path("/");
            origin.set_query(None);
            origin.set_fragment(None);
            let _ = origin.set_username("");
            let _ = origin.set_password(None);
            Some(origin)
        }
        _ => None,
    }
}

/// HTTP(S) bases for a camera: the stream URL's origin, then each host against the
/// configured, detected and catalogue HTTP ports.
pub fn http_bases(
    camera: &CameraConfig,
    detection: Option<&ProtocolDetectionResult>,
) -> CameraResult<Vec<Url>> {
    let endpoint = camera.endpoint()?;
    let stream = camera.parsed_stream_url()?;

    let mut bases = Vec::new();
    let mut hosts = Vec::new();
    if let Some(stream) = &stream {
        if let Some(base) = rtsp_to_http_base(stream) {
            bases.push(base);
        }
        if let Some(host) = stream.host_str() {
            hosts.push(host.trim_start_matches('[').trim_end_matches(']').to_string());
        }
    }
    hosts.push(endpoint.host().to_string());

    let mut ports: Vec<u16> = Vec::new();
    ports.extend(camera.http_port);
    ports.extend(detection.and_then(|d| d.port(ProtocolKind::Http)));
    ports.extend(HTTP_PORTS.iter().copied());

    for host in dedup(hosts) {
        for port in dedup(ports.iter().copied()) {
            bases.push(base_url(scheme_for_port(port), &host, port)?);
        }
    }
    Ok(dedup(bases))
}

/// Cross product of `bases` and `paths`, bases outermost.
pub fn join_candidates(bases: &[Url], paths: &[String]) -> Vec<Url> {
    dedup(
        bases
            .iter()
            .flat_map(|base| paths.iter().filter_map(move |path| base.join(path).ok())),
    )
}

pub fn ftp_base(camera: &CameraConfig) -> CameraResult<Url> {
    let endpoint = camera.endpoint()?;
    let port = camera.ftp_port.unwrap_or(FTP_PORTS[0]);
    base_url("ftp", endpoint.host(), port)
}

/// Live RTSP URLs: the declared stream URL when it is already RTSP, then the short
/// fallback list on the detected (or standard) RTSP port.
pub fn rtsp_fallback_candidates(
    camera: &CameraConfig,
    detection: Option<&ProtocolDetectionResult>,
) -> CameraResult<Vec<Url>> {
    let endpoint = camera.endpoint()?;
    let mut urls = Vec::new();
    let mut port = detection.and_then(|d| d.port(ProtocolKind::Rtsp));

    if let Some(stream) = camera.parsed_stream_url()? {
        if stream.scheme().eq_ignore_ascii_case("rtsp") {
            port = port.or(stream.port());
            urls.push(stream);
        }
    }

    let base = base_url("rtsp", endpoint.host(), port.unwrap_or(554))?;
    urls.extend(RTSP_FALLBACK_PATHS.iter().filter_map(|p| base.join(p).ok()));
    Ok(dedup(urls))
}

/// Embeds credentials as user-info for schemes external players accept that way. Other
/// schemes, and URLs that already carry a user, come back unchanged.
pub fn embed_credentials(url: &Url, credentials: Option<&Credentials>) -> Url {
    let Some(creds) = credentials else {
        return url.clone();
    };
    if !matches!(url.scheme(), "http" | "https" | "rtsp") || !url.username().is_empty() {
        return url.clone();
    }
    let mut with_auth = url.clone();
    if with_auth.set_username(&creds.username).is_err()
        || with_auth.set_password(Some(&creds.password)).is_err()
    {
        return url.clone();
    }
    with_auth
}
