//! # Prefetch Scheduler
//!
//! One background task that keeps the cache warm. Each cycle resolves the
//! current period, then walks every configured endpoint in order:
//!
//! 1. skip it when its breaker would deny the call;
//! 2. fetch, validate and store through [`FetchPipeline`] with the kind's
//!    record cap;
//! 3. log and move on when it fails.
//!
//! Between cycles the task sleeps for the configured interval. The sleep
//! races the shutdown signal and out-of-cycle refresh requests. A shutdown
//! raised mid-cycle lets the running endpoint finish and starts no other.
//!
//! Every refresh of an endpoint holds that endpoint's flight lock, so at
//! most one fetch per endpoint is in progress. Successful refreshes are
//! remembered per `(endpoint, period)`; on-demand misses inside the kind's
//! max age reuse them instead of calling upstream again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex as FlightLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::domain::{DataKind, Period};
use crate::endpoint::{EndpointKey, UpstreamSource};
use crate::error::{FetchError, FetchErrorKind};
use crate::fallback::{OnDemandRefresh, RefreshFuture};
use crate::pipeline::{FetchPipeline, RefreshReport};
use crate::season_state::PeriodProvider;

const REFRESH_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub default_cap: usize,
    pub caps: HashMap<DataKind, usize>,
}

impl SchedulerConfig {
    pub fn cap_for(&self, kind: DataKind) -> usize {
        self.caps.get(&kind).copied().unwrap_or(self.default_cap)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            default_cap: 2_000,
            caps: HashMap::from([
                (DataKind::Schedule, 600),
                (DataKind::SnapPct, 2_500),
                (DataKind::PracticeStatus, 2_500),
                (DataKind::Usage, 5_000),
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Refreshed,
    /// Breaker denied the call.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointReport {
    pub endpoint: EndpointKey,
    pub status: EndpointStatus,
    pub records_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one pass over the configured endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub period: Option<Period>,
    pub endpoints: Vec<EndpointReport>,
    /// Shutdown arrived before every endpoint was attempted.
    pub interrupted: bool,
}

impl CycleReport {
    pub fn records_written(&self) -> usize {
        self.endpoints.iter().map(|report| report.records_written).sum()
    }

    pub fn count(&self, status: EndpointStatus) -> usize {
        self.endpoints
            .iter()
            .filter(|report| report.status == status)
            .count()
    }
}

pub struct PrefetchScheduler {
    pipeline: Arc<FetchPipeline>,
    periods: Arc<dyn PeriodProvider>,
    sources: Vec<Arc<dyn UpstreamSource>>,
    config: SchedulerConfig,
    last_period: Mutex<Option<Period>>,
    in_flight: DashMap<EndpointKey, Arc<FlightLock<()>>>,
    refreshed_at: DashMap<(EndpointKey, Period), Instant>,
}

impl PrefetchScheduler {
    pub fn new(
        pipeline: Arc<FetchPipeline>,
        periods: Arc<dyn PeriodProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pipeline,
            periods,
            sources: Vec::new(),
            config,
            last_period: Mutex::new(None),
            in_flight: DashMap::new(),
            refreshed_at: DashMap::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn UpstreamSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn endpoints(&self) -> Vec<EndpointKey> {
        self.sources.iter().map(|source| source.key().clone()).collect()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// When `endpoint` last refreshed `period` successfully.
    pub fn last_refreshed(&self, endpoint: &EndpointKey, period: Period) -> Option<Instant> {
        self.refreshed_at
            .get(&(endpoint.clone(), period))
            .map(|entry| *entry.value())
    }

    fn flight_lock(&self, endpoint: &EndpointKey) -> Arc<FlightLock<()>> {
        Arc::clone(
            self.in_flight
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(FlightLock::new(())))
                .value(),
        )
    }

    fn refreshed_within(&self, endpoint: &EndpointKey, period: Period, window: Duration) -> bool {
        self.last_refreshed(endpoint, period)
            .is_some_and(|at| at.elapsed() < window)
    }

    /// Refresh one source under its flight lock and remember the success.
    async fn refresh_tracked(
        &self,
        source: &dyn UpstreamSource,
        period: Period,
    ) -> Result<RefreshReport, FetchError> {
        let lock = self.flight_lock(source.key());
        let _guard = lock.lock().await;
        self.refresh_locked(source, period).await
    }

    async fn refresh_locked(
        &self,
        source: &dyn UpstreamSource,
        period: Period,
    ) -> Result<RefreshReport, FetchError> {
        let cap = self.config.cap_for(source.kind());
        let report = self.pipeline.refresh(source, period, Some(cap)).await?;
        self.refreshed_at
            .insert((source.key().clone(), period), Instant::now());
        Ok(report)
    }

    /// Period for this cycle. A failed lookup reuses the last good one.
    pub async fn current_period(&self) -> Option<Period> {
        match self.periods.current_period().await {
            Ok(period) => {
                *self.last_period.lock() = Some(period);
                Some(period)
            }
            Err(error) => {
                let fallback = *self.last_period.lock();
                warn!(
                    code = error.code(),
                    error = %error,
                    reusing = ?fallback,
                    "current period lookup failed"
                );
                fallback
            }
        }
    }

    /// One pass over every endpoint. `shutdown` is checked before each one.
    pub async fn run_cycle(&self, shutdown: Option<&watch::Receiver<bool>>) -> CycleReport {
        let Some(period) = self.current_period().await else {
            warn!("no current period known; skipping prefetch cycle");
            return CycleReport {
                period: None,
                endpoints: Vec::new(),
                interrupted: false,
            };
        };

        let mut endpoints = Vec::with_capacity(self.sources.len());
        let mut interrupted = false;

        for source in &self.sources {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                interrupted = true;
                break;
            }
            endpoints.push(self.refresh_source(source.as_ref(), period).await);
        }

        CycleReport {
            period: Some(period),
            endpoints,
            interrupted,
        }
    }

    async fn refresh_source(&self, source: &dyn UpstreamSource, period: Period) -> EndpointReport {
        let endpoint = source.key().clone();
        if !self.pipeline.executor().breakers().would_allow(&endpoint) {
            debug!(endpoint = %endpoint, "circuit open; skipping endpoint this cycle");
            return EndpointReport {
                endpoint,
                status: EndpointStatus::Skipped,
                records_written: 0,
                error: None,
            };
        }

        match self.refresh_tracked(source, period).await {
            Ok(report) => EndpointReport {
                endpoint,
                status: EndpointStatus::Refreshed,
                records_written: report.records_written,
                error: None,
            },
            Err(error) => {
                warn!(
                    endpoint = %endpoint,
                    code = error.code(),
                    error = %error,
                    "prefetch failed; continuing with next endpoint"
                );
                let status = if error.kind() == FetchErrorKind::CircuitOpen {
                    EndpointStatus::Skipped
                } else {
                    EndpointStatus::Failed
                };
                EndpointReport {
                    endpoint,
                    status,
                    records_written: 0,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    /// Refresh one endpoint outside the cycle.
    pub async fn refresh_endpoint(&self, endpoint: &EndpointKey) -> Result<RefreshReport, FetchError> {
        let source = self
            .sources
            .iter()
            .find(|source| source.key() == endpoint)
            .ok_or_else(|| FetchError::internal(format!("unknown endpoint {endpoint}")))?;
        let period = self
            .current_period()
            .await
            .ok_or_else(|| FetchError::internal("current period is unknown"))?;

        self.refresh_tracked(source.as_ref(), period).await
    }

    /// Start the loop on the tokio runtime.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_DEPTH);
        let join = tokio::spawn(async move { self.run(shutdown_rx, refresh_rx).await });

        SchedulerHandle {
            shutdown: shutdown_tx,
            refresh: refresh_tx,
            join,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut refresh_requests: mpsc::Receiver<EndpointKey>,
    ) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            endpoints = self.sources.len(),
            "prefetch scheduler started"
        );
        let mut cycles = 0_u64;

        'cycles: loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(Some(&shutdown)).await;
            cycles += 1;
            info!(
                cycle = cycles,
                period = ?report.period,
                records = report.records_written(),
                refreshed = report.count(EndpointStatus::Refreshed),
                skipped = report.count(EndpointStatus::Skipped),
                failed = report.count(EndpointStatus::Failed),
                "prefetch cycle finished"
            );
            if report.interrupted {
                break;
            }

            let sleep = tokio::time::sleep(self.config.interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'cycles;
                        }
                    }
                    Some(endpoint) = refresh_requests.recv() => {
                        match self.refresh_endpoint(&endpoint).await {
                            Ok(report) => info!(
                                endpoint = %endpoint,
                                records = report.records_written,
                                "immediate refresh finished"
                            ),
                            Err(error) => warn!(
                                endpoint = %endpoint,
                                code = error.code(),
                                error = %error,
                                "immediate refresh failed"
                            ),
                        }
                    }
                }
            }
        }

        info!(cycles, "prefetch scheduler stopped");
    }
}

impl OnDemandRefresh for PrefetchScheduler {
    fn refresh_kind<'a>(&'a self, kind: DataKind, period: Period, fresh_for: Duration) -> RefreshFuture<'a> {
        Box::pin(async move {
            let mut written = 0;
            for source in self.sources.iter().filter(|source| source.kind() == kind) {
                let endpoint = source.key();
                if self.refreshed_within(endpoint, period, fresh_for) {
                    debug!(endpoint = %endpoint, %period, "refreshed recently; not fetching again");
                    continue;
                }
                if !self.pipeline.executor().breakers().would_allow(endpoint) {
                    continue;
                }

                let lock = self.flight_lock(endpoint);
                let _guard = lock.lock().await;
                // Another caller may have finished this refresh while we waited.
                if self.refreshed_within(endpoint, period, fresh_for) {
                    continue;
                }
                match self.refresh_locked(source.as_ref(), period).await {
                    Ok(report) => written += report.records_written,
                    Err(error) => warn!(
                        endpoint = %endpoint,
                        code = error.code(),
                        error = %error,
                        "on-demand fetch failed"
                    ),
                }
            }
            written
        })
    }
}

/// Control side of a spawned scheduler. Dropping it stops the loop at its
/// next sleep.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    refresh: mpsc::Sender<EndpointKey>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queue an out-of-cycle refresh. Returns `false` when the queue is full
    /// or the loop has exited.
    pub fn request_refresh(&self, endpoint: EndpointKey) -> bool {
        self.refresh.try_send(endpoint).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.join.await
    }
}
