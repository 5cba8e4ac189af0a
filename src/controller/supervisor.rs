//! Worker loop, periodic resync and retry policy.

use super::builder::RetryConfig;
use super::queue::{Enqueued, Enqueuer};
use super::reconciler::{Reconciler, SyncOutcome};
use crate::error::Result;
use crate::metrics::{MetricsErrorKind, MetricsRecorder};
use crate::prelude::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Maximum number of consecutive identical errors logged at WARN before
/// falling back to DEBUG.
pub(crate) const MAX_CONSECUTIVE_SAME_ERROR: u32 = 3;

/// Tracks consecutive occurrences of the same failure kind to suppress log noise.
///
/// The first `max_consecutive` occurrences of a kind are reported as warnings,
/// later ones as debug. A different kind, or a success, restarts the count.
#[derive(Debug)]
pub(crate) struct ErrorTracker {
    last_error_kind: Option<MetricsErrorKind>,
    consecutive_same_error: u32,
    max_consecutive: u32,
}

impl ErrorTracker {
    pub(crate) fn new(max_consecutive: u32) -> Self {
        Self {
            last_error_kind: None,
            consecutive_same_error: 0,
            max_consecutive,
        }
    }

    pub(crate) fn record_error(&mut self, error_kind: MetricsErrorKind) -> bool {
        let should_warn = self.last_error_kind != Some(error_kind)
            || self.consecutive_same_error < self.max_consecutive;

        if self.last_error_kind == Some(error_kind) {
            self.consecutive_same_error += 1;
        } else {
            self.consecutive_same_error = 1;
            self.last_error_kind = Some(error_kind);
        }

        should_warn
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive_same_error = 0;
        self.last_error_kind = None;
    }

    pub(crate) fn consecutive_count(&self) -> u32 {
        self.consecutive_same_error
    }
}

/// Exponential backoff with small jitter.
///
/// Doubles `current`, clamps to `max` and adds 0-10% jitter, still clamped to `max`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    let cur = current.as_millis().min(u128::from(u64::MAX)) as u64;
    let max = max.as_millis().min(u128::from(u64::MAX)) as u64;

    let base = (cur.saturating_mul(2)).min(max);
    if base == 0 {
        return Duration::from_millis(0);
    }

    let jitter = base / 10;
    let add = if jitter > 0 {
        fastrand::u64(0..=jitter)
    } else {
        0
    };

    Duration::from_millis((base.saturating_add(add)).min(max))
}

/// Retry deadline and backoff of the worker.
///
/// A failure arms a retry after the current backoff and advances it. A success
/// clears the deadline and restarts the backoff at `min_backoff`.
#[derive(Debug)]
pub(super) struct RetrySchedule {
    retry: RetryConfig,
    backoff: Duration,
    retry_at: Option<Instant>,
}

impl RetrySchedule {
    pub(super) fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            backoff: retry.min_backoff,
            retry_at: None,
        }
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Arms a retry and returns its delay.
    pub(super) fn failed(&mut self, now: Instant) -> Duration {
        let delay = self.backoff;
        self.retry_at = Some(now + delay);
        self.backoff = next_backoff(delay, self.retry.max_backoff);
        delay
    }

    pub(super) fn succeeded(&mut self) {
        self.backoff = self.retry.min_backoff;
        self.retry_at = None;
    }
}

/// Runs one reconciliation on the blocking pool and hands the reconciler back.
///
/// Provider reads and certificate parsing may block; running them here keeps
/// the runtime threads free for handshakes.
pub(super) async fn sync_blocking(
    mut reconciler: Reconciler,
) -> std::result::Result<(Reconciler, Result<SyncOutcome>), JoinError> {
    tokio::task::spawn_blocking(move || {
        let result = reconciler.sync();
        (reconciler, result)
    })
    .await
}

/// Processes triggers one at a time until `shutdown` fires.
///
/// A failed reconciliation arms a retry deadline; a trigger arriving before it
/// runs immediately and subsumes the retry. Shutdown is observed between
/// reconciliations only. The queue is closed on exit.
pub(super) async fn run_worker(
    mut reconciler: Reconciler,
    mut queue: mpsc::Receiver<()>,
    retry: RetryConfig,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    shutdown: CancellationToken,
) {
    let mut schedule = RetrySchedule::new(retry);

    loop {
        let retry_at = schedule.deadline();

        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("Client CA controller cancelled; stopping worker");
                break;
            }

            msg = queue.recv() => {
                if msg.is_none() {
                    debug!("Client CA trigger queue closed; stopping worker");
                    break;
                }
            }

            () = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                debug!("Retrying client CA reload");
            }
        }

        let (returned, result) = match sync_blocking(reconciler).await {
            Ok(done) => done,
            Err(_e) => {
                warn!("Client CA reload task failed; stopping worker: error={}", _e);
                if let Some(m) = &metrics {
                    m.record_error(MetricsErrorKind::WorkerJoinFailed);
                }
                break;
            }
        };
        reconciler = returned;

        match result {
            Ok(_) => schedule.succeeded(),
            Err(_) => {
                let _delay = schedule.failed(Instant::now());
                debug!("Client CA reload scheduled for retry: backoff_ms={}", _delay.as_millis());
                if let Some(m) = &metrics {
                    m.record_retry();
                }
            }
        }
    }

    queue.close();
}

/// Enqueues a reload immediately and then every `period`.
pub(super) async fn run_resync_ticker(
    enqueuer: Enqueuer,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if enqueuer.enqueue() == Enqueued::Closed {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tracker_demotes_repeated_errors() {
        let mut tracker = ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR);

        assert!(tracker.record_error(MetricsErrorKind::ParseBundle));
        assert!(tracker.record_error(MetricsErrorKind::ParseBundle));
        assert!(tracker.record_error(MetricsErrorKind::ParseBundle));
        assert!(!tracker.record_error(MetricsErrorKind::ParseBundle));
        assert_eq!(tracker.consecutive_count(), 4);

        assert!(tracker.record_error(MetricsErrorKind::EmptyBundle));
        assert_eq!(tracker.consecutive_count(), 1);

        tracker.reset();
        assert_eq!(tracker.consecutive_count(), 0);
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let max = Duration::from_secs(1000);

        let next = next_backoff(Duration::from_millis(5), max);
        assert!(next >= Duration::from_millis(10) && next <= Duration::from_millis(11));

        let clamped = next_backoff(Duration::from_secs(900), max);
        assert_eq!(clamped, max);

        assert_eq!(next_backoff(Duration::ZERO, max), Duration::ZERO);
    }

    #[test]
    fn success_restarts_backoff_at_minimum() {
        let retry = RetryConfig {
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(10),
        };
        let mut schedule = RetrySchedule::new(retry);
        let now = Instant::now();

        assert_eq!(schedule.deadline(), None);
        assert_eq!(schedule.failed(now), Duration::from_millis(10));
        assert_eq!(schedule.deadline(), Some(now + Duration::from_millis(10)));

        let second = schedule.failed(now);
        assert!(second >= Duration::from_millis(20) && second <= Duration::from_millis(22));
        let third = schedule.failed(now);
        assert!(third >= Duration::from_millis(40));

        schedule.succeeded();
        assert_eq!(schedule.deadline(), None);

        assert_eq!(schedule.failed(now), Duration::from_millis(10));
        assert_eq!(schedule.deadline(), Some(now + Duration::from_millis(10)));
    }

    #[test]
    fn retry_delay_never_exceeds_maximum() {
        let retry = RetryConfig {
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        let mut schedule = RetrySchedule::new(retry);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(schedule.failed(now) <= Duration::from_millis(50));
        }
        assert_eq!(schedule.failed(now), Duration::from_millis(50));
    }
}
