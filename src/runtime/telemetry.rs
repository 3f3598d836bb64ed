use crate::queue::TaskQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How often the reporter logs extraction throughput.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Sets up the fmt subscriber for the extractor binary and tests.
///
/// `RUST_LOG` selects the filter; without it only `info` and above is shown.
/// Repeat calls are no-ops.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Extraction counters shared by every worker.
#[derive(Default, Debug)]
pub struct Telemetry {
    records_inserted: AtomicU64,
    duplicates_skipped: AtomicU64,
    tasks_done: AtomicU64,
    tasks_requeued: AtomicU64,
    tasks_failed: AtomicU64,
    rate_limit_signals: AtomicU64,
    transient_failures: AtomicU64,
    dead_credentials: AtomicU64,
}

impl Telemetry {
    pub fn record_inserted(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.records_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_duplicates(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.duplicates_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_task_done(&self) {
        self.tasks_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_requeued(&self) {
        self.tasks_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limit_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_credential(&self) {
        self.dead_credentials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            tasks_done: self.tasks_done.load(Ordering::Relaxed),
            tasks_requeued: self.tasks_requeued.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            rate_limit_signals: self.rate_limit_signals.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            dead_credentials: self.dead_credentials.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub records_inserted: u64,
    pub duplicates_skipped: u64,
    pub tasks_done: u64,
    pub tasks_requeued: u64,
    pub tasks_failed: u64,
    pub rate_limit_signals: u64,
    pub transient_failures: u64,
    pub dead_credentials: u64,
}

/// Spawns a background task that periodically logs record throughput, queue
/// depth, and upstream signal counts.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Arc<dyn TaskQueue>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "matchpull::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let inserted_delta = current
                        .records_inserted
                        .saturating_sub(last_snapshot.records_inserted);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        inserted_delta as f64 / elapsed
                    };
                    let stats = queue.stats().await;

                    tracing::info!(
                        target: "matchpull::metrics",
                        throughput = format!("{throughput:.2}"),
                        inserted = current.records_inserted,
                        duplicates = current.duplicates_skipped,
                        pending = stats.pending,
                        in_flight = stats.in_flight,
                        failed = stats.failed,
                        rate_limited = current.rate_limit_signals,
                        transient = current.transient_failures,
                        dead_credentials = current.dead_credentials,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
