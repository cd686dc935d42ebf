//! # Service Boundary
//!
//! [`SnaplineService`] is the in-process API the surrounding system calls:
//! `fetch` for one fact and `trigger_immediate_refresh` for one endpoint.
//! [`SnaplineBuilder`] wires the cache, breakers, executor, pipeline,
//! scheduler and resolver from a [`SnaplineConfig`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cache::{CacheStore, Quality};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreakerRegistry};
use crate::config::SnaplineConfig;
use crate::domain::{DataKind, Entity, Period};
use crate::endpoint::{EndpointKey, HttpEndpoint, Provider, UpstreamSource};
use crate::error::{ConfigError, FetchError};
use crate::estimate::EstimateTable;
use crate::fallback::{FallbackResolver, Resolution, ResolvedSource};
use crate::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use crate::pipeline::{FetchPipeline, RefreshReport};
use crate::retry::RetryExecutor;
use crate::scheduler::{CycleReport, PrefetchScheduler, SchedulerHandle};
use crate::season_state::{LeagueStatePeriod, PeriodProvider};

/// Endpoint key used for the season-state lookup.
pub const LEAGUE_STATE_ENDPOINT: &str = "league-state";

/// How a fetched value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Exact,
    PriorPeriod,
    Estimated,
    Stale,
    Absent,
}

impl From<ResolvedSource> for SourceTag {
    fn from(source: ResolvedSource) -> Self {
        match source {
            ResolvedSource::Exact => Self::Exact,
            ResolvedSource::PriorPeriod => Self::PriorPeriod,
            ResolvedSource::Estimated => Self::Estimated,
            ResolvedSource::Stale => Self::Stale,
        }
    }
}

/// Answer to one `fetch`. Absence is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub value: Option<Value>,
    pub source_tag: SourceTag,
    pub quality: Option<Quality>,
    pub age_seconds: Option<u64>,
}

impl FetchOutcome {
    pub fn absent() -> Self {
        Self {
            value: None,
            source_tag: SourceTag::Absent,
            quality: None,
            age_seconds: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.source_tag == SourceTag::Absent
    }
}

impl From<Resolution> for FetchOutcome {
    fn from(resolution: Resolution) -> Self {
        Self {
            value: Some(resolution.value),
            source_tag: resolution.source.into(),
            quality: resolution.quality,
            age_seconds: resolution.age.map(|age| age.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Handed to the running scheduler loop.
    Queued { endpoint: EndpointKey },
    /// No loop running; refreshed inline.
    Completed { report: RefreshReport },
}

pub struct SnaplineService {
    store: Arc<CacheStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    executor: Arc<RetryExecutor>,
    scheduler: Arc<PrefetchScheduler>,
    resolver: FallbackResolver,
    running: Mutex<Option<SchedulerHandle>>,
}

impl SnaplineService {
    pub fn builder(config: SnaplineConfig) -> SnaplineBuilder {
        SnaplineBuilder::new(config)
    }

    /// Resolve one fact through the fallback chain.
    pub async fn fetch(&self, entity: &Entity, period: Period, kind: DataKind) -> FetchOutcome {
        self.resolver
            .resolve(entity, period, kind)
            .await
            .map(FetchOutcome::from)
            .unwrap_or_else(FetchOutcome::absent)
    }

    /// Refresh one endpoint now. With the loop running the request is
    /// queued to it; otherwise it runs inline.
    pub async fn trigger_immediate_refresh(&self, endpoint: &EndpointKey) -> Result<TriggerOutcome, FetchError> {
        if !self.scheduler.endpoints().contains(endpoint) {
            return Err(FetchError::internal(format!("unknown endpoint {endpoint}")));
        }

        let queued = self
            .running
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished() && handle.request_refresh(endpoint.clone()));
        if queued {
            return Ok(TriggerOutcome::Queued {
                endpoint: endpoint.clone(),
            });
        }

        let report = self.scheduler.refresh_endpoint(endpoint).await?;
        Ok(TriggerOutcome::Completed { report })
    }

    /// Spawn the prefetch loop. Returns `false` if it is already running.
    pub fn start_scheduler(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *running = Some(Arc::clone(&self.scheduler).spawn());
        true
    }

    /// Stop the prefetch loop and wait for it to exit.
    pub async fn stop_scheduler(&self) {
        let handle = self.running.lock().take();
        if let Some(handle) = handle {
            if let Err(error) = handle.shutdown().await {
                tracing::error!(error = %error, "prefetch scheduler task failed");
            }
        }
    }

    /// Run one prefetch cycle in the caller's task.
    pub async fn prefetch_once(&self) -> CycleReport {
        self.scheduler.run_cycle(None).await
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    pub fn scheduler(&self) -> &Arc<PrefetchScheduler> {
        &self.scheduler
    }

    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshot()
    }
}

pub struct SnaplineBuilder {
    config: SnaplineConfig,
    client: Option<Arc<dyn HttpClient>>,
    periods: Option<Arc<dyn PeriodProvider>>,
    estimates: EstimateTable,
    on_demand: bool,
}

impl SnaplineBuilder {
    pub fn new(config: SnaplineConfig) -> Self {
        Self {
            config,
            client: None,
            periods: None,
            estimates: EstimateTable::standard(),
            on_demand: true,
        }
    }

    /// Transport for every endpoint. Defaults to reqwest.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Current-period source. Defaults to the league state endpoint.
    pub fn with_period_provider(mut self, periods: Arc<dyn PeriodProvider>) -> Self {
        self.periods = Some(periods);
        self
    }

    pub fn with_estimates(mut self, estimates: EstimateTable) -> Self {
        self.estimates = estimates;
        self
    }

    /// Whether a full cache miss may fetch synchronously.
    pub fn with_on_demand_fetch(mut self, enabled: bool) -> Self {
        self.on_demand = enabled;
        self
    }

    pub fn build(self) -> Result<SnaplineService, ConfigError> {
        let config = self.config;
        config.validate()?;

        let client: Arc<dyn HttpClient> = match self.client {
            Some(client) => client,
            None => Arc::new(
                ReqwestHttpClient::new(
                    Duration::from_millis(config.upstream.connect_timeout_ms),
                    &config.upstream.user_agent,
                )
                .map_err(|e| ConfigError::invalid("upstream", e.to_string()))?,
            ),
        };

        let breakers = Arc::new(config.endpoints.iter().fold(
            CircuitBreakerRegistry::new(config.breaker.config()),
            |registry, endpoint| match endpoint.breaker {
                Some(_) => registry.with_override(endpoint.key.clone(), config.breaker_for(endpoint)),
                None => registry,
            },
        ));

        let executor = Arc::new(config.endpoints.iter().fold(
            RetryExecutor::new(Arc::clone(&breakers), config.retry.policy()),
            |executor, endpoint| match endpoint.retry {
                Some(_) => executor.with_override(endpoint.key.clone(), config.retry_for(endpoint)),
                None => executor,
            },
        ));

        let store = Arc::new(CacheStore::new());
        let pipeline = Arc::new(DataKind::ALL.iter().fold(
            FetchPipeline::new(Arc::clone(&executor), Arc::clone(&store)),
            |pipeline, kind| pipeline.with_rules(*kind, config.validation.rules(*kind)),
        ));

        let stats_auth = config.upstream.stats_auth();

        let periods: Arc<dyn PeriodProvider> = match self.periods {
            Some(periods) => periods,
            None => Arc::new(
                LeagueStatePeriod::new(
                    EndpointKey::parse(LEAGUE_STATE_ENDPOINT)?,
                    config.upstream.state_url(),
                    Arc::clone(&client),
                    Arc::clone(&executor),
                )
                .with_timeout_ms(config.upstream.request_timeout_ms),
            ),
        };

        let mut scheduler = PrefetchScheduler::new(Arc::clone(&pipeline), periods, config.scheduler.config());
        for endpoint in &config.endpoints {
            let auth = match endpoint.provider {
                Provider::Stats => stats_auth.clone(),
                Provider::League => HttpAuth::None,
            };
            let source: Arc<dyn UpstreamSource> = Arc::new(
                HttpEndpoint::new(
                    endpoint.key.clone(),
                    endpoint.kind,
                    endpoint.provider,
                    endpoint.url_template(&config.upstream),
                    Arc::clone(&client),
                )
                .with_auth(auth)
                .with_timeout_ms(endpoint.timeout_ms.unwrap_or(config.upstream.request_timeout_ms)),
            );
            scheduler = scheduler.with_source(source);
        }
        let scheduler = Arc::new(scheduler);

        let mut resolver = FallbackResolver::new(Arc::clone(&store), self.estimates)
            .with_max_age(config.cache.max_age_policy())
            .with_cached_estimates(config.cache.cache_estimates);
        if self.on_demand {
            resolver = resolver.with_refresher(scheduler.clone());
        }

        info!(
            endpoints = config.endpoints.len(),
            stats_auth = !matches!(stats_auth, HttpAuth::None),
            "snapline service built"
        );

        Ok(SnaplineService {
            store,
            breakers,
            executor,
            scheduler,
            resolver,
            running: Mutex::new(None),
        })
    }
}
