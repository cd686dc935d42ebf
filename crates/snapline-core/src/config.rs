//! # Configuration
//!
//! Settings are layered with `figment`, later sources overriding earlier:
//!
//! 1. [`SnaplineConfig::default()`]
//! 2. a TOML file, when one is given and exists
//! 3. `SNAPLINE_`-prefixed environment variables, `__` between sections
//!    (`SNAPLINE_RETRY__MAX_ATTEMPTS=6`)
//!
//! The stats API key is never part of the configuration tree. It is read
//! from the environment variable named by `upstream.stats_api_key_env`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::domain::DataKind;
use crate::endpoint::{EndpointKey, Provider, URL_PLACEHOLDERS};
use crate::error::ConfigError;
use crate::fallback::MaxAgePolicy;
use crate::http_client::HttpAuth;
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;
use crate::validation::ValidationRules;

pub const ENV_PREFIX: &str = "SNAPLINE_";
pub const DEFAULT_API_KEY_ENV: &str = "SNAPLINE_STATS_API_KEY";

/// One value per data kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerKind<T> {
    pub schedule: T,
    pub snap_pct: T,
    pub practice_status: T,
    pub usage: T,
}

impl<T: Copy> PerKind<T> {
    pub fn get(&self, kind: DataKind) -> T {
        match kind {
            DataKind::Schedule => self.schedule,
            DataKind::SnapPct => self.snap_pct,
            DataKind::PracticeStatus => self.practice_status,
            DataKind::Usage => self.usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub league_base_url: String,
    pub stats_base_url: String,
    /// Path of the league provider's season-state endpoint.
    pub state_path: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    pub stats_api_key_env: String,
    /// How the stats API key is attached to requests.
    pub stats_auth: StatsAuthStyle,
    /// Header or query parameter name carrying the key.
    pub stats_api_key_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsAuthStyle {
    #[default]
    Header,
    Bearer,
    Query,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            league_base_url: "https://api.sleeper.app".to_owned(),
            stats_base_url: "http://127.0.0.1:8700".to_owned(),
            state_path: "/v1/state/nfl".to_owned(),
            connect_timeout_ms: 3_000,
            request_timeout_ms: 8_000,
            user_agent: concat!("snapline/", env!("CARGO_PKG_VERSION")).to_owned(),
            stats_api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            stats_auth: StatsAuthStyle::Header,
            stats_api_key_name: "x-api-key".to_owned(),
        }
    }
}

impl UpstreamConfig {
    pub fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::League => &self.league_base_url,
            Provider::Stats => &self.stats_base_url,
        }
    }

    pub fn state_url(&self) -> String {
        join_url(&self.league_base_url, &self.state_path)
    }

    /// Reads the stats API key from the environment. Empty counts as unset.
    pub fn stats_api_key(&self) -> Option<String> {
        std::env::var(&self.stats_api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    /// Auth applied to stats requests; none when the key is unset.
    pub fn stats_auth(&self) -> HttpAuth {
        let Some(value) = self.stats_api_key() else {
            return HttpAuth::None;
        };
        let name = self.stats_api_key_name.clone();
        match self.stats_auth {
            StatsAuthStyle::Header => HttpAuth::Header { name, value },
            StatsAuthStyle::Bearer => HttpAuth::BearerToken(value),
            StatsAuthStyle::Query => HttpAuth::QueryParam { name, value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
        .with_jitter(self.jitter)
    }
}

/// Per-endpoint retry fields; unset fields inherit the global section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
}

impl RetryOverride {
    pub fn apply(&self, base: RetrySettings) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            initial_delay_ms: self.initial_delay_ms.unwrap_or(base.initial_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            jitter: base.jitter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub success_threshold: u32,
    /// Defaults to `success_threshold`.
    pub half_open_max_calls: Option<u32>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            success_threshold: 2,
            half_open_max_calls: None,
        }
    }
}

impl BreakerSettings {
    pub fn config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            success_threshold: self.success_threshold,
            half_open_max_calls: self.half_open_max_calls.unwrap_or(self.success_threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_secs: Option<u64>,
    pub success_threshold: Option<u32>,
}

impl BreakerOverride {
    pub fn apply(&self, base: BreakerSettings) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            reset_timeout_secs: self.reset_timeout_secs.unwrap_or(base.reset_timeout_secs),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            half_open_max_calls: base.half_open_max_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_age_secs: PerKind<u64>,
    /// Store heuristic estimates under the exact key.
    pub cache_estimates: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;
        Self {
            max_age_secs: PerKind {
                schedule: 7 * 24 * HOUR,
                snap_pct: 72 * HOUR,
                practice_status: 6 * HOUR,
                usage: 72 * HOUR,
            },
            cache_estimates: false,
        }
    }
}

impl CacheSettings {
    pub fn max_age_policy(&self) -> MaxAgePolicy {
        DataKind::ALL.iter().fold(
            MaxAgePolicy::new(Duration::from_secs(24 * 60 * 60)),
            |policy, kind| policy.with_kind(*kind, Duration::from_secs(self.max_age_secs.get(*kind))),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub record_caps: PerKind<usize>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 15 * 60,
            record_caps: PerKind {
                schedule: 600,
                snap_pct: 2_500,
                practice_status: 2_500,
                usage: 5_000,
            },
        }
    }
}

impl SchedulerSettings {
    pub fn config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.interval_secs),
            default_cap: self.record_caps.snap_pct,
            caps: DataKind::ALL
                .iter()
                .map(|kind| (*kind, self.record_caps.get(*kind)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub sample_size: usize,
    pub coverage_threshold: PerKind<f64>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        let threshold = |kind| ValidationRules::default_for(kind).coverage_threshold;
        Self {
            sample_size: ValidationRules::DEFAULT_SAMPLE_SIZE,
            coverage_threshold: PerKind {
                schedule: threshold(DataKind::Schedule),
                snap_pct: threshold(DataKind::SnapPct),
                practice_status: threshold(DataKind::PracticeStatus),
                usage: threshold(DataKind::Usage),
            },
        }
    }
}

impl ValidationSettings {
    pub fn rules(&self, kind: DataKind) -> ValidationRules {
        ValidationRules {
            coverage_threshold: self.coverage_threshold.get(kind),
            sample_size: self.sample_size,
        }
    }
}

/// One prefetched upstream endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub key: EndpointKey,
    pub kind: DataKind,
    pub provider: Provider,
    /// Absolute URL, or a path joined to the provider's base URL.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerOverride>,
}

impl EndpointConfig {
    pub fn url_template(&self, upstream: &UpstreamConfig) -> String {
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            return self.path.clone();
        }
        join_url(upstream.base_url(self.provider), &self.path)
    }
}

fn default_endpoints() -> Vec<EndpointConfig> {
    let endpoint = |key: &str, kind, provider, path: &str| -> Option<EndpointConfig> {
        Some(EndpointConfig {
            key: EndpointKey::parse(key).ok()?,
            kind,
            provider,
            path: path.to_owned(),
            timeout_ms: None,
            retry: None,
            breaker: None,
        })
    };

    [
        endpoint("schedule", DataKind::Schedule, Provider::Stats, "/schedules/{season}/{week}"),
        endpoint("snap-counts", DataKind::SnapPct, Provider::Stats, "/snap-counts/{season}/{week}"),
        endpoint("injuries", DataKind::PracticeStatus, Provider::Stats, "/injuries/{season}/{week}"),
        endpoint("usage", DataKind::Usage, Provider::League, "/v1/stats/nfl/regular/{season}/{week}"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnaplineConfig {
    pub upstream: UpstreamConfig,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub cache: CacheSettings,
    pub scheduler: SchedulerSettings,
    pub validation: ValidationSettings,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for SnaplineConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            cache: CacheSettings::default(),
            scheduler: SchedulerSettings::default(),
            validation: ValidationSettings::default(),
            endpoints: default_endpoints(),
        }
    }
}

impl SnaplineConfig {
    pub fn retry_for(&self, endpoint: &EndpointConfig) -> RetryPolicy {
        endpoint
            .retry
            .map(|overrides| overrides.apply(self.retry))
            .unwrap_or(self.retry)
            .policy()
    }

    pub fn breaker_for(&self, endpoint: &EndpointConfig) -> CircuitBreakerConfig {
        endpoint
            .breaker
            .map(|overrides| overrides.apply(self.breaker))
            .unwrap_or(self.breaker)
            .config()
    }

    pub fn endpoint(&self, key: &EndpointKey) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|endpoint| &endpoint.key == key)
    }

    /// Reject settings the runtime cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_retry("retry", &self.retry)?;
        validate_breaker("breaker", &self.breaker)?;

        if self.upstream.connect_timeout_ms == 0 || self.upstream.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("upstream", "timeouts must be greater than zero"));
        }
        for (field, url) in [
            ("upstream.league_base_url", &self.upstream.league_base_url),
            ("upstream.stats_base_url", &self.upstream.stats_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(field, format!("'{url}' is not an http(s) URL")));
            }
        }

        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::invalid("scheduler.interval_secs", "must be greater than zero"));
        }
        for kind in DataKind::ALL {
            if self.scheduler.record_caps.get(kind) == 0 {
                return Err(ConfigError::invalid(
                    format!("scheduler.record_caps.{kind}"),
                    "must be greater than zero",
                ));
            }
            let threshold = self.validation.coverage_threshold.get(kind);
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::invalid(
                    format!("validation.coverage_threshold.{kind}"),
                    format!("{threshold} is outside 0..=1"),
                ));
            }
        }
        if self.validation.sample_size == 0 {
            return Err(ConfigError::invalid("validation.sample_size", "must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            let field = format!("endpoints.{}", endpoint.key);
            if !seen.insert(&endpoint.key) {
                return Err(ConfigError::invalid(field, "duplicate endpoint key"));
            }
            if let Some(unknown) = unknown_placeholder(&endpoint.path) {
                return Err(ConfigError::invalid(
                    field,
                    format!("unknown placeholder '{unknown}', expected one of {URL_PLACEHOLDERS:?}"),
                ));
            }
            if endpoint.timeout_ms == Some(0) {
                return Err(ConfigError::invalid(field, "timeout_ms must be greater than zero"));
            }
            validate_retry(&field, &endpoint.retry.map_or(self.retry, |o| o.apply(self.retry)))?;
            validate_breaker(&field, &endpoint.breaker.map_or(self.breaker, |o| o.apply(self.breaker)))?;
        }

        Ok(())
    }
}

fn validate_retry(field: &str, retry: &RetrySettings) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::invalid(field, "max_attempts must be at least 1"));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::invalid(
            field,
            format!(
                "initial_delay_ms {} exceeds max_delay_ms {}",
                retry.initial_delay_ms, retry.max_delay_ms
            ),
        ));
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(ConfigError::invalid(field, "multiplier must be a finite value >= 1"));
    }
    Ok(())
}

fn validate_breaker(field: &str, breaker: &BreakerSettings) -> Result<(), ConfigError> {
    if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
        return Err(ConfigError::invalid(field, "breaker thresholds must be at least 1"));
    }
    if breaker.half_open_max_calls == Some(0) {
        return Err(ConfigError::invalid(field, "half_open_max_calls must be at least 1"));
    }
    Ok(())
}

/// First `{name}` token that is not a supported placeholder.
fn unknown_placeholder(template: &str) -> Option<&str> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            return Some(&rest[start..]);
        };
        let token = &rest[start..start + len + 1];
        if !URL_PLACEHOLDERS.contains(&token) {
            return Some(token);
        }
        rest = &rest[start + len + 1..];
    }
    None
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Builds a [`SnaplineConfig`] from defaults, a file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_owned(),
        }
    }

    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(SnaplineConfig::default()));

        if let Some(path) = &self.config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
                info!(path = %path.display(), "loaded configuration file");
            } else {
                debug!(path = %path.display(), "configuration file not found; using defaults");
            }
        }

        figment.merge(
            Env::prefixed(&self.env_prefix)
                .ignore(&["STATS_API_KEY", "LOG"])
                .split("__"),
        )
    }

    pub fn load(&self) -> Result<SnaplineConfig, ConfigError> {
        let config: SnaplineConfig = self.figment().extract()?;
        config.validate()?;
        Ok(config)
    }
}
