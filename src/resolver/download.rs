use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::StrategyKind;
use crate::ftp::{self, FtpClient, FtpError, FtpTarget};
use crate::knowledge::paths::DOWNLOAD_URL_KEYS;
use crate::probe::redact;
use crate::resolver::candidates::{ftp_base, http_bases, join_candidates, metadata_urls, recording_paths};
use crate::resolver::context::ResolveContext;
use crate::resolver::strategy::{Outcome, Strategy, StrategyList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSource {
    Metadata,
    HttpCandidate,
    FtpCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Source URL with credentials stripped.
    pub url: String,
    pub bytes: u64,
    pub source: DownloadSource,
}

/// A download job: the shared context plus where the file should land.
#[derive(Clone)]
pub struct DownloadJob {
    pub ctx: ResolveContext,
    pub destination: PathBuf,
}

/// `<destination>.part`, renamed into place by [`PartialFile::commit`] and removed on drop
/// otherwise.
pub struct PartialFile {
    part: PathBuf,
    destination: PathBuf,
    file: Option<File>,
}

impl PartialFile {
    pub async fn create(destination: &Path) -> std::io::Result<Self> {
        let mut name = destination.as_os_str().to_owned();
        name.push(".part");
        let part = PathBuf::from(name);
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&part).await?;
        Ok(Self {
            part,
            destination: destination.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn part_path(&self) -> &Path {
        &self.part
    }

    pub fn file(&mut self) -> std::io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("partial file already closed"))
    }

    pub async fn commit(mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&self.part, &self.destination).await?;
        // Renamed: nothing left for Drop to clean up.
        self.part = PathBuf::new();
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.part.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.part);
        }
    }
}

pub fn download_strategies() -> StrategyList<DownloadJob, DownloadReport> {
    vec![
        Box::new(MetadataDownload),
        Box::new(HttpTemplateDownload),
        Box::new(FtpTemplateDownload),
    ]
}

enum Transfer {
    Done(u64),
    Empty,
    Failed(String),
    Auth(String),
    /// FTP only: the control channel is out of step and the session must not be reused.
    SessionLost(String),
}

async fn http_download(job: &DownloadJob, url: &Url) -> Transfer {
    let ctx = &job.ctx;
    let mut request = ctx
        .http
        .client(ctx.camera.accept_self_signed_tls)
        .get(url.clone())
        .timeout(ctx.settings.download_timeout);
    let credentials = ctx.credentials();
    if let Some(creds) = &credentials {
        request = request.basic_auth(&creds.username, Some(&creds.password));
    }

    let mut response = match request.send().await {
        Ok(r) => r,
        Err(e) => return Transfer::Failed(e.to_string()),
    };
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED && credentials.is_some() {
        return Transfer::Auth(redact(url));
    }
    if status != StatusCode::OK {
        return Transfer::Failed(format!("status {}", status));
    }

    let mut partial = match PartialFile::create(&job.destination).await {
        Ok(p) => p,
        Err(e) => return Transfer::Failed(format!("create {}: {}", job.destination.display(), e)),
    };
    let mut bytes = 0u64;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let written = match partial.file() {
                    Ok(file) => file.write_all(&chunk).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    return Transfer::Failed(format!("write {}: {}", partial.part_path().display(), e));
                }
                bytes += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => return Transfer::Failed(format!("body: {}", e)),
        }
    }

    // Some servers answer 200 with an empty body for files they do not have.
    if bytes == 0 {
        return Transfer::Empty;
    }
    match partial.commit().await {
        Ok(()) => Transfer::Done(bytes),
        Err(e) => Transfer::Failed(format!("commit: {}", e)),
    }
}

/// Maps a finished RETR into the `.part` guard onto a [`Transfer`], committing on success.
async fn settle_ftp(partial: PartialFile, result: Result<u64, FtpError>) -> Transfer {
    match result {
        Ok(bytes) => match partial.commit().await {
            Ok(()) => Transfer::Done(bytes),
            Err(e) => Transfer::Failed(format!("commit: {}", e)),
        },
        Err(FtpError::EmptyTransfer) => Transfer::Empty,
        Err(e) if e.is_auth() => Transfer::Auth(e.to_string()),
        Err(e) if e.ends_session() => Transfer::SessionLost(e.to_string()),
        Err(e) => Transfer::Failed(e.to_string()),
    }
}

async fn ftp_retrieve(client: &mut FtpClient, path: &str, job: &DownloadJob) -> Transfer {
    let mut partial = match PartialFile::create(&job.destination).await {
        Ok(p) => p,
        Err(e) => return Transfer::Failed(format!("create {}: {}", job.destination.display(), e)),
    };
    let result = match partial.file() {
        Ok(file) => client.retrieve(path, file).await,
        Err(e) => Err(FtpError::Io(e)),
    };
    settle_ftp(partial, result).await
}

async fn ftp_download(job: &DownloadJob, url: &Url) -> Transfer {
    let target = match FtpTarget::parse(url) {
        Ok(t) => t,
        Err(e) => return Transfer::Failed(e.to_string()),
    };
    let mut partial = match PartialFile::create(&job.destination).await {
        Ok(p) => p,
        Err(e) => return Transfer::Failed(format!("create {}: {}", job.destination.display(), e)),
    };
    let credentials = job.ctx.credentials();
    let result = match partial.file() {
        Ok(file) => ftp::download(&target, credentials.as_ref(), file, job.ctx.settings.ftp_timeout).await,
        Err(e) => Err(FtpError::Io(e)),
    };
    match settle_ftp(partial, result).await {
        Transfer::Auth(_) => Transfer::Auth(redact(url)),
        other => other,
    }
}

fn report(url: &Url, bytes: u64, source: DownloadSource) -> Outcome<DownloadReport> {
    tracing::info!("Downloaded {} bytes from {}", bytes, redact(url));
    Outcome::Success(DownloadReport {
        url: redact(url),
        bytes,
        source,
    })
}

/// Download URL stored in the recording's metadata, dispatched by scheme.
pub struct MetadataDownload;

#[async_trait]
impl Strategy<DownloadJob, DownloadReport> for MetadataDownload {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MetadataUrl
    }

    async fn attempt(&self, job: &DownloadJob) -> Outcome<DownloadReport> {
        let urls: Vec<Url> = metadata_urls(&job.ctx.recording, DOWNLOAD_URL_KEYS)
            .into_iter()
            .filter(|u| matches!(u.scheme(), "http" | "https" | "ftp"))
            .collect();
        if urls.is_empty() {
            return Outcome::Skipped;
        }

        let mut empty = false;
        for url in &urls {
            let transfer = match url.scheme() {
                "ftp" => ftp_download(job, url).await,
                _ => http_download(job, url).await,
            };
            match transfer {
                Transfer::Done(bytes) => return report(url, bytes, DownloadSource::Metadata),
                Transfer::Auth(target) => return Outcome::AuthRejected(target),
                Transfer::Empty => empty = true,
                Transfer::Failed(reason) | Transfer::SessionLost(reason) => {
                    tracing::debug!("Metadata download {} failed: {}", redact(url), reason)
                }
            }
        }
        if empty {
            Outcome::Empty
        } else {
            Outcome::Unreachable(format!("{} metadata URLs failed", urls.len()))
        }
    }
}

/// GET over every vendor recording path on the open HTTP bases.
pub struct HttpTemplateDownload;

#[async_trait]
impl Strategy<DownloadJob, DownloadReport> for HttpTemplateDownload {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HttpTemplates
    }

    async fn attempt(&self, job: &DownloadJob) -> Outcome<DownloadReport> {
        let paths = recording_paths(&job.ctx.recording);
        if paths.is_empty() {
            return Outcome::Skipped;
        }
        let bases = match http_bases(&job.ctx.camera, job.ctx.detection.as_ref()) {
            Ok(b) => b,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let open = job.ctx.open_bases(bases).await;
        if open.is_empty() {
            return Outcome::Unreachable("no HTTP port open".to_string());
        }

        let mut answered = false;
        for url in join_candidates(&open, &paths) {
            match http_download(job, &url).await {
                Transfer::Done(bytes) => return report(&url, bytes, DownloadSource::HttpCandidate),
                Transfer::Auth(target) => return Outcome::AuthRejected(target),
                Transfer::Empty => {
                    tracing::debug!("{} answered 200 with no body", redact(&url));
                    answered = true;
                }
                Transfer::Failed(reason) | Transfer::SessionLost(reason) => {
                    tracing::trace!("{} failed: {}", redact(&url), reason);
                    answered = true;
                }
            }
        }
        if answered {
            Outcome::Empty
        } else {
            Outcome::Unreachable("no HTTP candidate answered".to_string())
        }
    }
}

/// RETR over every vendor recording path in one FTP session.
pub struct FtpTemplateDownload;

#[async_trait]
impl Strategy<DownloadJob, DownloadReport> for FtpTemplateDownload {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FtpTemplates
    }

    async fn attempt(&self, job: &DownloadJob) -> Outcome<DownloadReport> {
        let paths = recording_paths(&job.ctx.recording);
        if paths.is_empty() {
            return Outcome::Skipped;
        }
        let base = match ftp_base(&job.ctx.camera) {
            Ok(b) => b,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let target = match FtpTarget::parse(&base) {
            Ok(t) => t,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };

        let credentials = job.ctx.credentials();
        let mut client =
            match FtpClient::open(&target, credentials.as_ref(), job.ctx.settings.ftp_timeout).await {
                Ok(c) => c,
                Err(e) if e.is_auth() => return Outcome::AuthRejected(redact(&base)),
                Err(e) => return Outcome::Unreachable(e.to_string()),
            };

        for url in join_candidates(std::slice::from_ref(&base), &paths) {
            let path = match FtpTarget::parse(&url) {
                Ok(t) => t.path,
                Err(_) => continue,
            };
            match ftp_retrieve(&mut client, &path, job).await {
                Transfer::Done(bytes) => {
                    client.quit().await;
                    return report(&url, bytes, DownloadSource::FtpCandidate);
                }
                Transfer::Empty => tracing::debug!("FTP {} transferred nothing", path),
                Transfer::Failed(reason) => tracing::trace!("FTP {} failed: {}", path, reason),
                Transfer::Auth(target) => return Outcome::AuthRejected(target),
                Transfer::SessionLost(reason) => {
                    // Dropping the client closes both sockets without reading the stale reply.
                    tracing::debug!("FTP session lost at {}: {}", path, reason);
                    return Outcome::Unreachable(reason);
                }
            }
        }
        client.quit().await;
        Outcome::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_file_is_removed_unless_committed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");

        {
            let mut partial = PartialFile::create(&dest).await.unwrap();
            partial.file().unwrap().write_all(b"abc").await.unwrap();
            assert!(partial.part_path().exists());
        }
        assert!(!dir.path().join("clip.mp4.part").exists());
        assert!(!dest.exists());

        let mut partial = PartialFile::create(&dest).await.unwrap();
        partial.file().unwrap().write_all(b"abc").await.unwrap();
        partial.commit().await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
        assert!(!dir.path().join("clip.mp4.part").exists());
    }
}
