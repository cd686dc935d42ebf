//! # Snapline Core
//!
//! Resilient fetch and cache layer between a tool-calling client and two
//! unreliable upstream providers (a league/roster provider and a
//! stats/news provider).
//!
//! ## Overview
//!
//! - **Bounded retries** with exponential backoff per endpoint
//! - **Circuit breakers** keyed by endpoint, created on first use
//! - **Response validation** before anything is trusted or cached
//! - **Layered cache** with an exact → prior period → estimate fallback
//! - **Background prefetch** so foreground reads are normally cache hits
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Concurrent record store with the estimate write rule |
//! | [`circuit_breaker`] | Per-endpoint breakers and their registry |
//! | [`config`] | Layered configuration (defaults, TOML, environment) |
//! | [`domain`] | Entities, periods, data kinds, cache keys |
//! | [`endpoint`] | Endpoint keys and the upstream fetch contract |
//! | [`error`] | Key, configuration and fetch errors |
//! | [`estimate`] | Heuristic estimate table |
//! | [`fallback`] | Fallback chain and resolver |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`pipeline`] | Fetch → validate → store for one endpoint |
//! | [`retry`] | Retry policy and executor |
//! | [`scheduler`] | Background prefetch loop |
//! | [`season_state`] | Current-period providers |
//! | [`service`] | In-process boundary API |
//! | [`validation`] | Per-kind response validators |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐            ┌──────────────────┐
//! │ Prefetch         │            │ SnaplineService  │
//! │ Scheduler        │            │ fetch()          │
//! └────────┬─────────┘            └────────┬─────────┘
//!          │                               ▼
//!          │                      ┌──────────────────┐
//!          │◀──── on full miss ───│ Fallback         │
//!          │                      │ Resolver         │
//!          ▼                      └────────┬─────────┘
//! ┌──────────────────┐     ┌──────────────┐│
//! │ Retry Executor   │────▶│ Circuit      ││
//! └────────┬─────────┘     │ Breakers     ││
//!          ▼               └──────────────┘│
//! ┌──────────────────┐                     │
//! │ Validator        │                     │
//! └────────┬─────────┘                     ▼
//!          │                      ┌──────────────────┐
//!          └─────────────────────▶│ Cache Store      │
//!                                 └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use snapline_core::{ConfigLoader, DataKind, Entity, EntityId, Period, Position, SnaplineService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     let service = SnaplineService::builder(config).build()?;
//!     service.start_scheduler();
//!
//!     let player = Entity::new(EntityId::parse("4034")?, Position::Rb).with_depth_rank(1);
//!     let outcome = service.fetch(&player, Period::new(2024, 8)?, DataKind::SnapPct).await;
//!     println!("{:?} from {:?}", outcome.value, outcome.source_tag);
//!
//!     service.stop_scheduler().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Upstream failures are classified so callers can decide what to do:
//!
//! ```rust
//! use snapline_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::CircuitOpen => "endpoint is cooling down",
//!         FetchErrorKind::ClientError => "request was rejected upstream",
//!         _ if error.retryable() => "transient upstream failure",
//!         _ => "unexpected failure",
//!     }
//! }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod estimate;
pub mod fallback;
pub mod http_client;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod season_state;
pub mod service;
pub mod validation;

// Cache
pub use cache::{CacheRecord, CacheRow, CacheStore, PutOutcome, Quality, RecordSource};

// Circuit breaker
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};

// Configuration
pub use config::{ConfigLoader, EndpointConfig, SnaplineConfig, StatsAuthStyle};

// Domain
pub use domain::{CacheKey, DataKind, Entity, EntityId, Period, Position};

// Endpoints and transport
pub use endpoint::{EndpointKey, HttpEndpoint, Provider, UpstreamFuture, UpstreamSource};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Errors
pub use error::{ConfigError, FetchError, FetchErrorKind, KeyError};

// Fallback
pub use estimate::EstimateTable;
pub use fallback::{
    FallbackChain, FallbackResolver, FallbackTier, MaxAgePolicy, OnDemandRefresh, Resolution,
    ResolvedSource,
};

// Fetching and scheduling
pub use pipeline::{FetchPipeline, RefreshReport};
pub use retry::{AttemptStats, Backoff, RetryExecutor, RetryPolicy};
pub use scheduler::{
    CycleReport, EndpointReport, EndpointStatus, PrefetchScheduler, SchedulerConfig,
    SchedulerHandle,
};
pub use season_state::{FixedPeriod, LeagueStatePeriod, PeriodProvider};

// Service boundary
pub use service::{FetchOutcome, SnaplineBuilder, SnaplineService, SourceTag, TriggerOutcome};

// Validation
pub use validation::{
    validate, NormalizedRecord, ValidatedBatch, ValidationOutcome, ValidationResult,
    ValidationRules,
};
