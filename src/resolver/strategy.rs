use async_trait::async_trait;

use crate::error::{CameraError, CameraResult, StrategyKind};

/// Result of one strategy attempt. Everything except `Success` and `AuthRejected` is
/// absorbed by [`resolve`] and the next strategy runs.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    /// The strategy does not apply (no input for it, or cached as unsupported). It is not
    /// counted as attempted.
    Skipped,
    /// The device answered but had nothing to offer.
    Empty,
    /// The device answered with something other than the expected protocol semantics.
    Mismatch(String),
    Unreachable(String),
    /// Credentials were rejected. Surfaced immediately and never retried.
    AuthRejected(String),
}

impl<T> Outcome<T> {
    /// The device spoke to us, even if it produced nothing usable.
    pub fn device_answered(&self) -> bool {
        matches!(self, Outcome::Success(_) | Outcome::Empty | Outcome::Mismatch(_))
    }
}

#[async_trait]
pub trait Strategy<C: Sync, T: Send>: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn attempt(&self, ctx: &C) -> Outcome<T>;
}

pub type StrategyList<C, T> = Vec<Box<dyn Strategy<C, T>>>;

struct Walk<T> {
    found: Option<T>,
    attempted: Vec<StrategyKind>,
    answered: bool,
}

async fn walk<C: Sync, T: Send>(
    operation: &'static str,
    strategies: &[Box<dyn Strategy<C, T>>],
    ctx: &C,
) -> CameraResult<Walk<T>> {
    let mut attempted = Vec::new();
    let mut answered = false;

    for strategy in strategies {
        let kind = strategy.kind();
        let outcome = strategy.attempt(ctx).await;
        answered |= outcome.device_answered();
        match outcome {
            Outcome::Success(value) => {
                attempted.push(kind);
                tracing::debug!("{}: {} succeeded", operation, kind);
                return Ok(Walk {
                    found: Some(value),
                    attempted,
                    answered,
                });
            }
            Outcome::AuthRejected(target) => {
                tracing::warn!("{}: {} rejected credentials at {}", operation, kind, target);
                return Err(CameraError::auth(target));
            }
            Outcome::Skipped => {
                tracing::trace!("{}: {} skipped", operation, kind);
            }
            Outcome::Empty => {
                tracing::debug!("{}: {} answered with nothing", operation, kind);
                attempted.push(kind);
            }
            Outcome::Mismatch(reason) => {
                tracing::debug!("{}: {} mismatch: {}", operation, kind, reason);
                attempted.push(kind);
            }
            Outcome::Unreachable(reason) => {
                tracing::debug!("{}: {} unreachable: {}", operation, kind, reason);
                attempted.push(kind);
            }
        }
    }

    Ok(Walk {
        found: None,
        attempted,
        answered,
    })
}

/// Runs `strategies` in order and returns the first success. Exhaustion reports every
/// strategy that was actually attempted.
pub async fn resolve<C: Sync, T: Send>(
    operation: &'static str,
    strategies: &[Box<dyn Strategy<C, T>>],
    ctx: &C,
) -> CameraResult<T> {
    let walk = walk(operation, strategies, ctx).await?;
    match walk.found {
        Some(value) => Ok(value),
        None => {
            tracing::warn!("{}: exhausted after {:?}", operation, walk.attempted);
            Err(CameraError::exhausted(operation, walk.attempted))
        }
    }
}

/// Like [`resolve`], but a device that answered any strategy yields `T::default()`
/// instead of exhaustion.
pub async fn resolve_or_default<C: Sync, T: Send + Default>(
    operation: &'static str,
    strategies: &[Box<dyn Strategy<C, T>>],
    ctx: &C,
) -> CameraResult<T> {
    let walk = walk(operation, strategies, ctx).await?;
    match walk.found {
        Some(value) => Ok(value),
        None if walk.answered => Ok(T::default()),
        None => {
            tracing::warn!("{}: exhausted after {:?}", operation, walk.attempted);
            Err(CameraError::exhausted(operation, walk.attempted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        kind: StrategyKind,
        outcome: fn() -> Outcome<u32>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Strategy<(), u32> for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn attempt(&self, _ctx: &()) -> Outcome<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn scripted(
        kind: StrategyKind,
        outcome: fn() -> Outcome<u32>,
        calls: &Arc<AtomicUsize>,
    ) -> Box<dyn Strategy<(), u32>> {
        Box::new(Scripted {
            kind,
            outcome,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn test_first_success_stops_the_walk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list = vec![
            scripted(StrategyKind::MetadataUrl, || Outcome::Unreachable("x".into()), &calls),
            scripted(StrategyKind::HttpTemplates, || Outcome::Success(7), &calls),
            scripted(StrategyKind::RtspFallback, || Outcome::Success(9), &calls),
        ];
        assert_eq!(resolve("op", &list, &()).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_attempted_but_not_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list = vec![
            scripted(StrategyKind::MetadataUrl, || Outcome::Skipped, &calls),
            scripted(StrategyKind::HttpTemplates, || Outcome::Empty, &calls),
            scripted(StrategyKind::FtpTemplates, || Outcome::Unreachable("refused".into()), &calls),
        ];
        match resolve("download_recording", &list, &()).await {
            Err(CameraError::ExhaustedStrategies { operation, attempted }) => {
                assert_eq!(operation, "download_recording");
                assert_eq!(attempted, vec![StrategyKind::HttpTemplates, StrategyKind::FtpTemplates]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_rejection_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list = vec![
            scripted(StrategyKind::HttpTemplates, || Outcome::AuthRejected("http://cam".into()), &calls),
            scripted(StrategyKind::FtpTemplates, || Outcome::Success(1), &calls),
        ];
        assert!(matches!(
            resolve("op", &list, &()).await,
            Err(CameraError::AuthenticationFailure { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_answered_device_yields_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list = vec![
            scripted(StrategyKind::OnvifProfileG, || Outcome::Mismatch("fault".into()), &calls),
            scripted(StrategyKind::FtpListing, || Outcome::Unreachable("refused".into()), &calls),
        ];
        assert_eq!(resolve_or_default("search", &list, &()).await.unwrap(), 0);

        let silent = vec![scripted(StrategyKind::FtpListing, || Outcome::Unreachable("x".into()), &calls)];
        assert!(resolve_or_default("search", &silent, &()).await.is_err());
    }
}
