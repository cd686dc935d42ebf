//! Current-period lookup for the prefetch loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::Period;
use crate::endpoint::{get_json, EndpointKey};
use crate::error::FetchError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryExecutor;
use crate::validation::{u16_field, u8_field, RecordView};

pub type PeriodFuture<'a> = Pin<Box<dyn Future<Output = Result<Period, FetchError>> + Send + 'a>>;

/// Source of the season/week the scheduler should prefetch.
pub trait PeriodProvider: Send + Sync {
    fn current_period<'a>(&'a self) -> PeriodFuture<'a>;
}

/// Always answers the same period.
#[derive(Debug, Clone, Copy)]
pub struct FixedPeriod(pub Period);

impl PeriodProvider for FixedPeriod {
    fn current_period<'a>(&'a self) -> PeriodFuture<'a> {
        let period = self.0;
        Box::pin(async move { Ok(period) })
    }
}

/// Reads `{ "season": .., "week": .. }` from the league provider's state
/// endpoint, through the retry executor under its own endpoint key.
pub struct LeagueStatePeriod {
    key: EndpointKey,
    url: String,
    timeout_ms: u64,
    client: Arc<dyn HttpClient>,
    executor: Arc<RetryExecutor>,
}

impl LeagueStatePeriod {
    pub fn new(
        key: EndpointKey,
        url: impl Into<String>,
        client: Arc<dyn HttpClient>,
        executor: Arc<RetryExecutor>,
    ) -> Self {
        Self {
            key,
            url: url.into(),
            timeout_ms: 8_000,
            client,
            executor,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }
}

impl PeriodProvider for LeagueStatePeriod {
    fn current_period<'a>(&'a self) -> PeriodFuture<'a> {
        Box::pin(async move {
            let key = &self.key;
            let client = self.client.as_ref();
            let url = self.url.as_str();
            let timeout_ms = self.timeout_ms;

            self.executor
                .execute(key, move || async move {
                    let request = HttpRequest::get(url)
                        .with_header("accept", "application/json")
                        .with_timeout_ms(timeout_ms);
                    let state = get_json(client, key, request).await?;
                    parse_league_state(key, &state)
                })
                .await
        })
    }
}

/// Preseason reports week 0; it is treated as week 1.
fn parse_league_state(key: &EndpointKey, state: &Value) -> Result<Period, FetchError> {
    let Value::Object(fields) = state else {
        return Err(FetchError::decode(format!("{key} state is not a JSON object")));
    };
    let record = RecordView::new(None, fields);

    let season = u16_field(&record, &["season", "league_season"])
        .ok_or_else(|| FetchError::decode(format!("{key} state has no season")))?;
    let week = u8_field(&record, &["week", "display_week"])
        .ok_or_else(|| FetchError::decode(format!("{key} state has no week")))?;

    Period::new(season, week.max(1))
        .map_err(|e| FetchError::decode(format!("{key} state has an invalid period: {e}")))
}
