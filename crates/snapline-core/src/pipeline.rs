//! Fetch, validate and store for one endpoint.
//!
//! Validation runs inside the retried call, so a rejected payload counts as
//! a failed attempt against the endpoint's retry budget and breaker.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheRecord, CacheStore, PutOutcome, Quality};
use crate::domain::{CacheKey, DataKind, Period};
use crate::endpoint::{EndpointKey, UpstreamSource};
use crate::error::FetchError;
use crate::retry::RetryExecutor;
use crate::validation::{validate, Derivation, ValidationOutcome, ValidationRules};

/// What one refresh wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub endpoint: EndpointKey,
    pub kind: DataKind,
    pub period: Period,
    pub outcome: ValidationOutcome,
    pub coverage: Option<f64>,
    pub records_written: usize,
    /// Records beyond the per-kind cap.
    pub records_capped: usize,
    pub messages: Vec<String>,
}

pub struct FetchPipeline {
    executor: Arc<RetryExecutor>,
    store: Arc<CacheStore>,
    rules: HashMap<DataKind, ValidationRules>,
}

impl FetchPipeline {
    pub fn new(executor: Arc<RetryExecutor>, store: Arc<CacheStore>) -> Self {
        let rules = DataKind::ALL
            .iter()
            .map(|kind| (*kind, ValidationRules::default_for(*kind)))
            .collect();
        Self {
            executor,
            store,
            rules,
        }
    }

    pub fn with_rules(mut self, kind: DataKind, rules: ValidationRules) -> Self {
        self.rules.insert(kind, rules);
        self
    }

    pub fn executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn rules_for(&self, kind: DataKind) -> ValidationRules {
        self.rules
            .get(&kind)
            .copied()
            .unwrap_or_else(|| ValidationRules::default_for(kind))
    }

    /// Fetch `source` for `period` and cache at most `cap` records.
    pub async fn refresh(
        &self,
        source: &dyn UpstreamSource,
        period: Period,
        cap: Option<usize>,
    ) -> Result<RefreshReport, FetchError> {
        let endpoint = source.key();
        let kind = source.kind();
        let rules = self.rules_for(kind);

        let batch = self
            .executor
            .execute(endpoint, move || async move {
                let payload = source.fetch(period).await?;
                let batch = validate(kind, &payload, period, &rules);
                if !batch.result.is_cacheable() {
                    return Err(FetchError::rejected(format!(
                        "{endpoint} payload rejected: {}",
                        batch.result.messages.join("; ")
                    )));
                }
                Ok(batch)
            })
            .await?;

        let quality = batch.result.quality().unwrap_or(Quality::Partial);
        let limit = cap.unwrap_or(usize::MAX);
        let total = batch.records.len();
        let mut written = 0_usize;

        for record in batch.records.into_iter().take(limit) {
            let cached = match record.derivation {
                Derivation::Reported => CacheRecord::upstream(record.value, quality),
                Derivation::Computed => CacheRecord::computed(record.value, quality),
            };
            let key = CacheKey::new(record.entity, record.period, kind);
            if self.store.put(key, cached) != PutOutcome::Skipped {
                written += 1;
            }
        }

        let capped = total.saturating_sub(limit);
        if capped > 0 {
            debug!(endpoint = %endpoint, cap = limit, capped, "record cap reached");
        }

        let result = batch.result;
        if result.outcome == ValidationOutcome::ValidWithWarning {
            warn!(
                endpoint = %endpoint,
                coverage = result.coverage.unwrap_or_default(),
                messages = ?result.messages,
                "payload cached with partial quality"
            );
        } else if !result.messages.is_empty() {
            debug!(endpoint = %endpoint, messages = ?result.messages, "validation notes");
        }

        info!(
            endpoint = %endpoint,
            kind = %kind,
            period = %period,
            records = written,
            "endpoint refreshed"
        );

        Ok(RefreshReport {
            endpoint: endpoint.clone(),
            kind,
            period,
            outcome: result.outcome,
            coverage: result.coverage,
            records_written: written,
            records_capped: capped,
            messages: result.messages,
        })
    }
}
