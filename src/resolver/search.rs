use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use reqwest::StatusCode;
use std::sync::OnceLock;
use url::Url;

use crate::camera::endpoint::{CameraEndpoint, Credentials};
use crate::camera::types::{
    matches_recording_type, CameraCapabilities, ProtocolKind, RecordingDescriptor, TimeRange,
};
use crate::camera::CapabilityCache;
use crate::error::{CameraResult, StrategyKind};
use crate::ftp::{FtpClient, FtpEntry, FtpTarget};
use crate::knowledge::paths::{has_video_extension, RECORDING_DIRECTORIES};
use crate::onvif::{OnvifNegotiator, SoapError};
use crate::probe::redact;
use crate::resolver::candidates::{ftp_base, http_bases};
use crate::resolver::context::ResolveContext;
use crate::resolver::strategy::{Outcome, Strategy, StrategyList};

const MAX_SUBDIRECTORIES: usize = 16;

/// A recording search: the shared context plus the caller's filters and the ONVIF state.
#[derive(Clone)]
pub struct SearchJob {
    pub ctx: ResolveContext,
    pub range: TimeRange,
    pub recording_type: Option<String>,
    pub negotiator: OnvifNegotiator,
    pub cache: CapabilityCache,
    pub capabilities: Option<CameraCapabilities>,
}

impl SearchJob {
    fn camera_id(&self) -> &str {
        &self.ctx.camera.id
    }

    fn onvif_endpoint(&self) -> CameraResult<CameraEndpoint> {
        let endpoint = self.ctx.camera.endpoint()?;
        match self.ctx.detection.as_ref().and_then(|d| d.port(ProtocolKind::Onvif)) {
            Some(port) if port != endpoint.port() => endpoint.on_port(port),
            _ => Ok(endpoint),
        }
    }

    /// Range and type filter, keeping device order.
    fn filter(&self, recordings: Vec<RecordingDescriptor>) -> Vec<RecordingDescriptor> {
        recordings
            .into_iter()
            .filter(|r| self.range.overlaps(r.start_time, r.end_time))
            .filter(|r| matches_recording_type(r, self.recording_type.as_deref()))
            .collect()
    }
}

pub fn search_strategies() -> StrategyList<SearchJob, Vec<RecordingDescriptor>> {
    vec![
        Box::new(ProfileGSearch),
        Box::new(RecordingServiceSearch),
        Box::new(FtpListingSearch),
        Box::new(HttpIndexSearch),
    ]
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})(\d{2})(\d{2})[_\-T]?(\d{2})(\d{2})(\d{2})")
            .unwrap_or_else(|e| panic!("invalid filename pattern: {}", e))
    })
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)["']"#)
            .unwrap_or_else(|e| panic!("invalid href pattern: {}", e))
    })
}

/// Start time embedded in names like `clip_20260301_101500.mp4` or `20260301101500.dav`.
pub fn filename_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let caps = filename_regex().captures(name)?;
    let n = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let date = NaiveDate::from_ymd_opt(n(1)? as i32, n(2)?, n(3)?)?;
    Some(date.and_hms_opt(n(4)?, n(5)?, n(6)?)?.and_utc())
}

fn listed_descriptor(
    name: &str,
    path: &str,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
    source: &str,
    urls: &[(&str, &Url)],
) -> RecordingDescriptor {
    let mut rec = RecordingDescriptor {
        id: path.to_string(),
        filename: name.to_string(),
        start_time: filename_timestamp(name).or(modified),
        size_bytes: size,
        ..Default::default()
    };
    rec.metadata.insert("path".to_string(), path.to_string());
    rec.metadata.insert("source".to_string(), source.to_string());
    for (key, url) in urls {
        rec.metadata.insert(key.to_string(), url.to_string());
    }
    rec
}

fn soap_outcome(
    err: SoapError,
    target: &str,
) -> Outcome<Vec<RecordingDescriptor>> {
    if err.is_auth() {
        Outcome::AuthRejected(target.to_string())
    } else if err.device_answered() {
        Outcome::Mismatch(err.to_string())
    } else {
        Outcome::Unreachable(err.to_string())
    }
}

/// ONVIF Profile G `FindRecordings` search.
pub struct ProfileGSearch;

#[async_trait]
impl Strategy<SearchJob, Vec<RecordingDescriptor>> for ProfileGSearch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OnvifProfileG
    }

    async fn attempt(&self, job: &SearchJob) -> Outcome<Vec<RecordingDescriptor>> {
        if job.cache.profile_g(job.camera_id()).await.is_no() {
            return Outcome::Skipped;
        }
        let Some(caps) = job.capabilities.as_ref() else {
            return Outcome::Skipped;
        };
        let Some(search_url) = caps.services.search.as_deref() else {
            job.cache.mark_profile_g(job.camera_id(), false).await;
            return Outcome::Mismatch("no search service advertised".to_string());
        };
        let endpoint = match job.onvif_endpoint() {
            Ok(e) => e,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };

        match job.negotiator.search_profile_g(&endpoint, &caps.services).await {
            Ok(recordings) => {
                job.cache.mark_profile_g(job.camera_id(), true).await;
                tracing::debug!("Profile G search returned {} recordings", recordings.len());
                Outcome::Success(job.filter(recordings))
            }
            Err(e) => {
                if e.device_answered() && !e.is_auth() {
                    tracing::info!(
                        "{} does not implement Profile G search ({}), falling back",
                        job.camera_id(),
                        e
                    );
                    job.cache.mark_profile_g(job.camera_id(), false).await;
                }
                soap_outcome(e, search_url)
            }
        }
    }
}

/// `GetRecordings` for devices with a recording service but no search service.
pub struct RecordingServiceSearch;

#[async_trait]
impl Strategy<SearchJob, Vec<RecordingDescriptor>> for RecordingServiceSearch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OnvifRecordingService
    }

    async fn attempt(&self, job: &SearchJob) -> Outcome<Vec<RecordingDescriptor>> {
        let Some(caps) = job.capabilities.as_ref() else {
            return Outcome::Skipped;
        };
        let Some(recording_url) = caps.services.recording.as_deref() else {
            return Outcome::Skipped;
        };
        let endpoint = match job.onvif_endpoint() {
            Ok(e) => e,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };

        match job.negotiator.list_recording_service(&endpoint, &caps.services).await {
            Ok(recordings) if recordings.is_empty() => Outcome::Empty,
            Ok(recordings) => Outcome::Success(job.filter(recordings)),
            Err(e) => soap_outcome(e, recording_url),
        }
    }
}

/// Directory listing over FTP, synthesising descriptors from video files.
pub struct FtpListingSearch;

impl FtpListingSearch {
    async fn collect(
        client: &mut FtpClient,
        base: &Url,
    ) -> Vec<RecordingDescriptor> {
        let mut found = Vec::new();
        for dir in RECORDING_DIRECTORIES {
            let entries = match client.list(dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    tracing::debug!("FTP LIST {} failed: {}", dir, e);
                    if e.ends_session() {
                        break;
                    }
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            Self::push_files(&mut found, base, dir, &entries, &mut subdirs);
            for sub in subdirs.into_iter().take(MAX_SUBDIRECTORIES) {
                match client.list(&sub).await {
                    Ok(entries) => Self::push_files(&mut found, base, &sub, &entries, &mut Vec::new()),
                    Err(e) if e.ends_session() => return found,
                    Err(e) => tracing::trace!("FTP LIST {} failed: {}", sub, e),
                }
            }
        }
        found
    }

    fn push_files(
        found: &mut Vec<RecordingDescriptor>,
        base: &Url,
        dir: &str,
        entries: &[FtpEntry],
        subdirs: &mut Vec<String>,
    ) {
        for entry in entries {
            let path = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
            if entry.is_dir {
                subdirs.push(path);
                continue;
            }
            if !has_video_extension(&entry.name) || found.iter().any(|r: &RecordingDescriptor| r.id == path) {
                continue;
            }
            let Ok(url) = base.join(&path) else {
                continue;
            };
            found.push(listed_descriptor(
                &entry.name,
                &path,
                entry.size,
                entry.modified,
                "ftp",
                &[("downloadUrl", &url)],
            ));
        }
    }
}

#[async_trait]
impl Strategy<SearchJob, Vec<RecordingDescriptor>> for FtpListingSearch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FtpListing
    }

    async fn attempt(&self, job: &SearchJob) -> Outcome<Vec<RecordingDescriptor>> {
        let base = match ftp_base(&job.ctx.camera) {
            Ok(b) => b,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let target = match FtpTarget::parse(&base) {
            Ok(t) => t,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let credentials = job.ctx.credentials().unwrap_or_else(Credentials::anonymous);

        let mut client =
            match FtpClient::connect(&target.host, target.port, job.ctx.settings.ftp_timeout).await {
                Ok(c) => c,
                Err(e) => return Outcome::Unreachable(e.to_string()),
            };
        if let Err(e) = client.login(&credentials).await {
            return if e.is_auth() {
                Outcome::AuthRejected(redact(&base))
            } else {
                Outcome::Mismatch(e.to_string())
            };
        }

        let found = Self::collect(&mut client, &base).await;
        client.quit().await;

        if found.is_empty() {
            Outcome::Empty
        } else {
            tracing::debug!("FTP listing found {} recordings", found.len());
            Outcome::Success(job.filter(found))
        }
    }
}

/// Scrapes `href` links to video files from HTTP directory index pages.
pub struct HttpIndexSearch;

impl HttpIndexSearch {
    pub fn scrape(page: &Url, html: &str) -> Vec<Url> {
        let mut links: Vec<Url> = Vec::new();
        for caps in href_regex().captures_iter(html) {
            let Some(href) = caps.get(1).map(|m| m.as_str().trim()) else {
                continue;
            };
            if !has_video_extension(href) {
                continue;
            }
            if let Ok(url) = page.join(href) {
                if !links.contains(&url) {
                    links.push(url);
                }
            }
        }
        links
    }
}

#[async_trait]
impl Strategy<SearchJob, Vec<RecordingDescriptor>> for HttpIndexSearch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HttpIndexListing
    }

    async fn attempt(&self, job: &SearchJob) -> Outcome<Vec<RecordingDescriptor>> {
        let ctx = &job.ctx;
        let bases = match http_bases(&ctx.camera, ctx.detection.as_ref()) {
            Ok(b) => b,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let open = ctx.open_bases(bases).await;
        if open.is_empty() {
            return Outcome::Unreachable("no HTTP port open".to_string());
        }

        let credentials = ctx.credentials();
        let client = ctx.http.client(ctx.camera.accept_self_signed_tls);
        let mut found = Vec::new();

        for base in &open {
            for dir in RECORDING_DIRECTORIES {
                let Ok(page) = base.join(&format!("{}/", dir.trim_end_matches('/'))) else {
                    continue;
                };
                let mut request = client.get(page.clone()).timeout(ctx.settings.probe_timeout);
                if let Some(creds) = &credentials {
                    request = request.basic_auth(&creds.username, Some(&creds.password));
                }
                let response = match request.send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::trace!("Index {} failed: {}", redact(&page), e);
                        continue;
                    }
                };
                match response.status() {
                    StatusCode::OK => {}
                    StatusCode::UNAUTHORIZED if credentials.is_some() => {
                        return Outcome::AuthRejected(redact(&page))
                    }
                    status => {
                        tracing::trace!("Index {} answered {}", redact(&page), status);
                        continue;
                    }
                }
                let Ok(html) = response.text().await else {
                    continue;
                };
                for link in Self::scrape(&page, &html) {
                    let name = link
                        .path_segments()
                        .and_then(|mut s| s.next_back())
                        .unwrap_or_default()
                        .to_string();
                    let path = link.path().to_string();
                    if found.iter().any(|r: &RecordingDescriptor| r.id == path) {
                        continue;
                    }
                    found.push(listed_descriptor(
                        &name,
                        &path,
                        None,
                        None,
                        "http-index",
                        &[("playbackUrl", &link), ("downloadUrl", &link)],
                    ));
                }
            }
            if !found.is_empty() {
                break;
            }
        }

        if found.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Success(job.filter(found))
        }
    }
}
