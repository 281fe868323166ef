//! Subscription supervisor.
//!
//! Owns the canonical and side head subscriptions and forwards their
//! notifications, in arrival order, into the reconciliation engine's channel.
//! A subscription that fails with a transient error, or simply ends, is
//! re-established on its own with exponential backoff and jitter; the other
//! subscription and the engine keep running. Permanent errors stop the
//! supervisor.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::chain::{ChainClient, ChainHeader, HeadKind, HeadStream};
use crate::error::{TrackerError, TrackerResult};
use crate::reorg::HeadEvent;

/// Resubscribe timing.
///
/// # Default Settings
///
/// - Max attempts: 10
/// - Initial delay: 1 second
/// - Max delay: 60 seconds
/// - Exponential backoff with ±25% jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Consecutive failed subscribe attempts before giving up
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay before jitter
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Default timing with a custom attempt limit.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay following `delay`: doubled, capped, then jittered by up to 25%.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let doubled = std::cmp::min(delay.saturating_mul(2), self.max_delay);
        let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
        doubled.mul_f64(1.0 + jitter)
    }
}

/// Keeps both head subscriptions alive and feeds the engine.
pub struct Supervisor<C: ChainClient + ?Sized> {
    client: Arc<C>,
    events: mpsc::Sender<HeadEvent>,
    backoff: BackoffPolicy,
}

impl<C: ChainClient + ?Sized> Supervisor<C> {
    /// Create a supervisor forwarding into `events`.
    #[must_use]
    pub const fn new(
        client: Arc<C>,
        events: mpsc::Sender<HeadEvent>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            events,
            backoff,
        }
    }

    /// Run until shutdown, until the engine stops receiving, or until a
    /// subscription fails permanently.
    ///
    /// # Errors
    ///
    /// Returns permanent subscription errors and
    /// [`TrackerError::MaxReconnectAttemptsExceeded`].
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> TrackerResult<()> {
        let mut canonical = self.subscribe(HeadKind::Canonical).await?;
        let mut side = self.subscribe(HeadKind::Side).await?;
        let mut forwarded: u64 = 0;

        loop {
            let (kind, item) = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(forwarded, "Supervisor stopping on shutdown");
                        return Ok(());
                    }
                    continue;
                }
                next = next_head(&mut canonical, &mut side) => next,
            };

            match item {
                Some(Ok(header)) => {
                    debug!(%kind, number = header.number(), hash = %header.hash, "Head received");
                    let event = match kind {
                        HeadKind::Canonical => HeadEvent::Canonical(header),
                        HeadKind::Side => HeadEvent::Side(header),
                    };
                    if self.events.send(event).await.is_err() {
                        info!(forwarded, "Engine stopped receiving, supervisor exiting");
                        return Ok(());
                    }
                    forwarded += 1;
                }
                Some(Err(e)) if e.is_transient() => {
                    warn!(%kind, error = %e, "Subscription dropped, resubscribing");
                    self.replace(kind, &mut canonical, &mut side).await?;
                }
                Some(Err(e)) => {
                    warn!(%kind, error = %e, "Subscription failed permanently");
                    return Err(e);
                }
                None => {
                    warn!(%kind, "Subscription ended, resubscribing");
                    self.replace(kind, &mut canonical, &mut side).await?;
                }
            }
        }
    }

    async fn replace(
        &self,
        kind: HeadKind,
        canonical: &mut HeadStream,
        side: &mut HeadStream,
    ) -> TrackerResult<()> {
        let stream = self.subscribe(kind).await?;
        match kind {
            HeadKind::Canonical => *canonical = stream,
            HeadKind::Side => *side = stream,
        }
        Ok(())
    }

    /// Open a subscription, retrying transient failures with backoff.
    #[instrument(skip(self))]
    async fn subscribe(&self, kind: HeadKind) -> TrackerResult<HeadStream> {
        let mut attempt: u32 = 0;
        let mut delay = self.backoff.initial_delay;

        loop {
            match self.client.subscribe(kind).await {
                Ok(stream) => {
                    info!(attempts = attempt + 1, "Subscription active");
                    return Ok(stream);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.backoff.max_attempts {
                        return Err(TrackerError::max_reconnect_exceeded(
                            attempt,
                            e.to_string(),
                        ));
                    }

                    warn!(
                        attempt,
                        max_attempts = self.backoff.max_attempts,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Subscribe failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = self.backoff.next_delay(delay);
                }
            }
        }
    }
}

/// Next item from whichever stream is ready first.
///
/// When both are ready the pick is random, so neither stream can starve the
/// other.
async fn next_head(
    canonical: &mut HeadStream,
    side: &mut HeadStream,
) -> (HeadKind, Option<TrackerResult<ChainHeader>>) {
    tokio::select! {
        item = canonical.next() => (HeadKind::Canonical, item),
        item = side.next() => (HeadKind::Side, item),
    }
}
