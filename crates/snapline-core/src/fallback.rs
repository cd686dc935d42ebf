//! # Fallback Resolution
//!
//! Turns one logical request into an ordered chain of tiers and returns the
//! first hit:
//!
//! | Tier | Hit condition | Tag |
//! |------|---------------|-----|
//! | Exact period | observed record within the kind's max age | `exact` |
//! | Prior period | kind supports it, position applies, observed record present | `prior_period` |
//! | Estimate | heuristic table has a value for `(kind, position, rank)` | `estimated` |
//!
//! Cached estimates are ignored by the first two tiers so a guess is never
//! reported as real data. When every tier misses, an optional
//! [`OnDemandRefresh`] runs one synchronous fetch and the exact tier is
//! read again. Kinds that do not apply to the entity's position never
//! trigger that fetch.
//!
//! If nothing fresh turns up, an exact record past its max age is still
//! returned, tagged `stale`, before the request is reported absent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cache::{CacheRecord, CacheStore, Quality};
use crate::domain::{CacheKey, DataKind, Entity, Period, Position};
use crate::estimate::EstimateTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedSource {
    Exact,
    PriorPeriod,
    Estimated,
    /// Exact-period record older than the kind's max age.
    Stale,
}

impl ResolvedSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::PriorPeriod => "prior_period",
            Self::Estimated => "estimated",
            Self::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackTier {
    Exact(CacheKey),
    PriorPeriod(CacheKey),
    Estimate {
        kind: DataKind,
        position: Position,
        depth_rank: Option<u8>,
    },
}

/// Ordered tiers for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    tiers: Vec<FallbackTier>,
}

impl FallbackChain {
    pub fn build(entity: &Entity, period: Period, kind: DataKind) -> Self {
        let exact = CacheKey::new(entity.id.clone(), period, kind);
        let prior = period
            .prior()
            .filter(|_| kind.supports_prior_period() && kind.applies_to(entity.position))
            .map(|prior| exact.at_period(prior));

        let mut tiers = vec![FallbackTier::Exact(exact)];
        tiers.extend(prior.map(FallbackTier::PriorPeriod));

        tiers.push(FallbackTier::Estimate {
            kind,
            position: entity.position,
            depth_rank: entity.depth_rank,
        });

        Self { tiers }
    }

    pub fn tiers(&self) -> &[FallbackTier] {
        &self.tiers
    }

    fn exact_key(&self) -> Option<&CacheKey> {
        self.tiers.iter().find_map(|tier| match tier {
            FallbackTier::Exact(key) => Some(key),
            _ => None,
        })
    }
}

/// A resolved value and how it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub value: Value,
    pub source: ResolvedSource,
    pub quality: Option<Quality>,
    /// Age of the backing record; `None` for estimates computed on the spot.
    pub age: Option<Duration>,
}

/// Per-kind staleness limits for the exact tier.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxAgePolicy {
    default: Duration,
    per_kind: HashMap<DataKind, Duration>,
}

impl MaxAgePolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            per_kind: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: DataKind, max_age: Duration) -> Self {
        self.per_kind.insert(kind, max_age);
        self
    }

    pub fn max_age(&self, kind: DataKind) -> Duration {
        self.per_kind.get(&kind).copied().unwrap_or(self.default)
    }
}

impl Default for MaxAgePolicy {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;
        Self::new(Duration::from_secs(24 * HOUR))
            .with_kind(DataKind::Schedule, Duration::from_secs(7 * 24 * HOUR))
            .with_kind(DataKind::SnapPct, Duration::from_secs(72 * HOUR))
            .with_kind(DataKind::PracticeStatus, Duration::from_secs(6 * HOUR))
            .with_kind(DataKind::Usage, Duration::from_secs(72 * HOUR))
    }
}

pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = usize> + Send + 'a>>;

/// Synchronous fetch used on a full cache miss.
pub trait OnDemandRefresh: Send + Sync {
    /// Fetch every source serving `kind` for `period`, skipping sources
    /// refreshed for that period within `fresh_for`. Returns records written.
    fn refresh_kind<'a>(&'a self, kind: DataKind, period: Period, fresh_for: Duration) -> RefreshFuture<'a>;
}

pub struct FallbackResolver {
    store: Arc<CacheStore>,
    estimates: EstimateTable,
    max_age: MaxAgePolicy,
    cache_estimates: bool,
    refresher: Option<Arc<dyn OnDemandRefresh>>,
}

impl FallbackResolver {
    pub fn new(store: Arc<CacheStore>, estimates: EstimateTable) -> Self {
        Self {
            store,
            estimates,
            max_age: MaxAgePolicy::default(),
            cache_estimates: false,
            refresher: None,
        }
    }

    pub fn with_max_age(mut self, max_age: MaxAgePolicy) -> Self {
        self.max_age = max_age;
        self
    }

    /// Store estimates under the exact key. Observed records still win.
    pub fn with_cached_estimates(mut self, enabled: bool) -> Self {
        self.cache_estimates = enabled;
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn OnDemandRefresh>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn chain(&self, entity: &Entity, period: Period, kind: DataKind) -> FallbackChain {
        FallbackChain::build(entity, period, kind)
    }

    /// Walk the chain against the cache only.
    pub fn resolve_cached(&self, entity: &Entity, period: Period, kind: DataKind) -> Option<Resolution> {
        let chain = self.chain(entity, period, kind);
        let now = OffsetDateTime::now_utc();
        chain
            .tiers()
            .iter()
            .find_map(|tier| self.try_tier(&chain, tier, entity, now))
    }

    /// Walk the chain; on a full miss run the on-demand refresher once and
    /// retry the exact tier. A stale exact record is the last resort.
    pub async fn resolve(&self, entity: &Entity, period: Period, kind: DataKind) -> Option<Resolution> {
        if let Some(resolution) = self.resolve_cached(entity, period, kind) {
            return Some(resolution);
        }

        let exact = CacheKey::new(entity.id.clone(), period, kind);
        let max_age = self.max_age.max_age(kind);

        let refresher = self
            .refresher
            .as_ref()
            .filter(|_| kind.applies_to(entity.position));
        if let Some(refresher) = refresher {
            debug!(entity = %entity.id, %period, kind = %kind, "full cache miss, fetching on demand");
            let written = refresher.refresh_kind(kind, period, max_age).await;
            debug!(entity = %entity.id, written, "on-demand fetch finished");
            let fresh = self.try_observed(&exact, ResolvedSource::Exact, Some(max_age), OffsetDateTime::now_utc());
            if fresh.is_some() {
                return fresh;
            }
        }

        let stale = self.try_observed(&exact, ResolvedSource::Stale, None, OffsetDateTime::now_utc())?;
        warn!(
            key = %exact,
            age_secs = ?stale.age.map(|age| age.as_secs()),
            "serving stale record"
        );
        Some(stale)
    }

    fn try_tier(
        &self,
        chain: &FallbackChain,
        tier: &FallbackTier,
        entity: &Entity,
        now: OffsetDateTime,
    ) -> Option<Resolution> {
        match tier {
            FallbackTier::Exact(key) => {
                self.try_observed(key, ResolvedSource::Exact, Some(self.max_age.max_age(key.kind)), now)
            }
            FallbackTier::PriorPeriod(key) => self.try_observed(key, ResolvedSource::PriorPeriod, None, now),
            FallbackTier::Estimate { kind, .. } => {
                let value = self.estimates.lookup(*kind, entity)?;
                if self.cache_estimates {
                    if let Some(key) = chain.exact_key() {
                        self.store.put(key.clone(), CacheRecord::estimated(value.clone()));
                    }
                }
                Some(Resolution {
                    value,
                    source: ResolvedSource::Estimated,
                    quality: None,
                    age: None,
                })
            }
        }
    }

    fn try_observed(
        &self,
        key: &CacheKey,
        source: ResolvedSource,
        max_age: Option<Duration>,
        now: OffsetDateTime,
    ) -> Option<Resolution> {
        let record = self.store.get(key).filter(|record| record.source.is_observed())?;
        let age = record.age_at(now);
        if max_age.is_some_and(|limit| age > limit) {
            debug!(key = %key, age_secs = age.as_secs(), "cached record is older than max age");
            return None;
        }

        Some(Resolution {
            value: record.value,
            source,
            quality: record.quality,
            age: Some(age),
        })
    }
}
