use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::error::StrategyKind;
use crate::probe::{redact, ProbeStatus};
use crate::resolver::candidates::{
    embed_credentials, http_bases, join_candidates, playback_metadata_urls, playback_paths,
    rtsp_fallback_candidates,
};
use crate::resolver::context::ResolveContext;
use crate::resolver::strategy::{Outcome, Strategy, StrategyList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSource {
    Metadata,
    HttpCandidate,
    /// The camera's live stream, not the recording itself.
    RtspLive,
}

/// A validated URL ready for an external player. Credentials are embedded as user-info
/// where the scheme allows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackUrl {
    pub url: String,
    pub source: PlaybackSource,
}

impl PlaybackUrl {
    fn new(url: &Url, source: PlaybackSource, ctx: &ResolveContext) -> Self {
        Self {
            url: embed_credentials(url, ctx.credentials().as_ref()).to_string(),
            source,
        }
    }
}

pub fn playback_strategies() -> StrategyList<ResolveContext, PlaybackUrl> {
    vec![
        Box::new(MetadataPlayback),
        Box::new(HttpTemplatePlayback),
        Box::new(RtspLiveFallback),
    ]
}

async fn rtsp_port_open(ctx: &ResolveContext, url: &Url) -> bool {
    let (Some(host), port) = (url.host_str(), url.port().unwrap_or(554)) else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ctx.prober
        .probe_rtsp_port(host, port, ctx.settings.rtsp_timeout)
        .await
}

/// Probes `candidates` in order and returns the first reachable one.
async fn first_reachable_http(
    ctx: &ResolveContext,
    candidates: &[Url],
    source: PlaybackSource,
) -> Outcome<PlaybackUrl> {
    let credentials = ctx.credentials();
    for candidate in candidates {
        let status = ctx
            .prober
            .probe_http(
                candidate,
                credentials.as_ref(),
                ctx.camera.accept_self_signed_tls,
                ctx.settings.probe_timeout,
            )
            .await;
        match status {
            ProbeStatus::Reachable => {
                tracing::info!("Playback candidate {} reachable", redact(candidate));
                return Outcome::Success(PlaybackUrl::new(candidate, source, ctx));
            }
            ProbeStatus::AuthRequired => return Outcome::AuthRejected(redact(candidate)),
            ProbeStatus::Denied => {
                tracing::debug!("Playback candidate {} refused", redact(candidate));
                continue;
            }
            ProbeStatus::Unreachable => continue,
        }
    }
    Outcome::Unreachable(format!("{} candidates unreachable", candidates.len()))
}

/// URLs the device itself put in the recording's metadata.
pub struct MetadataPlayback;

#[async_trait]
impl Strategy<ResolveContext, PlaybackUrl> for MetadataPlayback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MetadataUrl
    }

    async fn attempt(&self, ctx: &ResolveContext) -> Outcome<PlaybackUrl> {
        let urls = playback_metadata_urls(&ctx.recording);
        if urls.is_empty() {
            return Outcome::Skipped;
        }

        let credentials = ctx.credentials();
        for url in &urls {
            match url.scheme() {
                "http" | "https" => {
                    let status = ctx
                        .prober
                        .probe_http(
                            url,
                            credentials.as_ref(),
                            ctx.camera.accept_self_signed_tls,
                            ctx.settings.probe_timeout,
                        )
                        .await;
                    match status {
                        ProbeStatus::Reachable => {
                            return Outcome::Success(PlaybackUrl::new(url, PlaybackSource::Metadata, ctx))
                        }
                        ProbeStatus::AuthRequired => return Outcome::AuthRejected(redact(url)),
                        ProbeStatus::Denied | ProbeStatus::Unreachable => {}
                    }
                }
                "rtsp" => {
                    if rtsp_port_open(ctx, url).await {
                        return Outcome::Success(PlaybackUrl::new(url, PlaybackSource::Metadata, ctx));
                    }
                }
                other => tracing::debug!("Metadata URL scheme {} not playable", other),
            }
        }
        Outcome::Unreachable(format!("{} metadata URLs failed", urls.len()))
    }
}

/// Vendor path templates on every open HTTP base.
pub struct HttpTemplatePlayback;

#[async_trait]
impl Strategy<ResolveContext, PlaybackUrl> for HttpTemplatePlayback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HttpTemplates
    }

    async fn attempt(&self, ctx: &ResolveContext) -> Outcome<PlaybackUrl> {
        let bases = match http_bases(&ctx.camera, ctx.detection.as_ref()) {
            Ok(b) => b,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };
        let open = ctx.open_bases(bases).await;
        if open.is_empty() {
            return Outcome::Unreachable("no HTTP port open".to_string());
        }
        let candidates = join_candidates(&open, &playback_paths(&ctx.recording));
        tracing::debug!(
            "Probing {} HTTP playback candidates on {} bases",
            candidates.len(),
            open.len()
        );
        first_reachable_http(ctx, &candidates, PlaybackSource::HttpCandidate).await
    }
}

/// Last resort: the live stream. Only offered when enabled.
pub struct RtspLiveFallback;

#[async_trait]
impl Strategy<ResolveContext, PlaybackUrl> for RtspLiveFallback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RtspFallback
    }

    async fn attempt(&self, ctx: &ResolveContext) -> Outcome<PlaybackUrl> {
        if !ctx.settings.live_stream_fallback {
            return Outcome::Skipped;
        }
        let candidates = match rtsp_fallback_candidates(&ctx.camera, ctx.detection.as_ref()) {
            Ok(c) => c,
            Err(e) => return Outcome::Mismatch(e.to_string()),
        };

        let mut checked: Vec<(String, u16)> = Vec::new();
        for url in &candidates {
            let key = (url.host_str().unwrap_or_default().to_string(), url.port().unwrap_or(554));
            if checked.contains(&key) {
                continue;
            }
            if rtsp_port_open(ctx, url).await {
                tracing::info!("Falling back to live stream {}", redact(url));
                return Outcome::Success(PlaybackUrl::new(url, PlaybackSource::RtspLive, ctx));
            }
            checked.push(key);
        }
        Outcome::Unreachable("RTSP port closed".to_string())
    }
}
