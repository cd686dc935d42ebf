//! Scripted upstream doubles shared by the behaviour tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use snapline_core::{
    DataKind, EndpointKey, FetchError, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
    Period, UpstreamFuture, UpstreamSource,
};

pub fn key(raw: &str) -> EndpointKey {
    EndpointKey::parse(raw).expect("valid endpoint key")
}

pub fn period(season: u16, week: u8) -> Period {
    Period::new(season, week).expect("valid period")
}

/// Upstream source that replays queued results, then repeats a fallback.
pub struct ScriptedSource {
    key: EndpointKey,
    kind: DataKind,
    queued: Mutex<VecDeque<Result<Value, FetchError>>>,
    fallback: Result<Value, FetchError>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(raw_key: &str, kind: DataKind, fallback: Result<Value, FetchError>) -> Self {
        Self {
            key: key(raw_key),
            kind,
            queued: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ok(raw_key: &str, kind: DataKind, payload: Value) -> Self {
        Self::new(raw_key, kind, Ok(payload))
    }

    pub fn always_failing(raw_key: &str, kind: DataKind, error: FetchError) -> Self {
        Self::new(raw_key, kind, Err(error))
    }

    pub fn then(self, result: Result<Value, FetchError>) -> Self {
        self.queued.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UpstreamSource for ScriptedSource {
    fn key(&self) -> &EndpointKey {
        &self.key
    }

    fn kind(&self) -> DataKind {
        self.kind
    }

    fn fetch<'a>(&'a self, _period: Period) -> UpstreamFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.queued.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        })
    }
}

/// HTTP transport that answers by URL fragment and records every URL.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<(String, Result<HttpResponse, HttpError>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, fragment: &str, response: Result<HttpResponse, HttpError>) -> Self {
        self.routes.lock().push((fragment.to_owned(), response));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url.contains(fragment))
            .count()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let response = self
                .routes
                .lock()
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| Err(HttpError::connect(format!("no route for {}", request.url))));
            self.requests.lock().push(request);
            response
        })
    }
}

pub fn shared(client: ScriptedHttpClient) -> Arc<ScriptedHttpClient> {
    Arc::new(client)
}

/// `count` snap-share rows for one week; the first `with_metric` carry a share.
pub fn snap_rows(season: u16, week: u8, count: usize, with_metric: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|index| {
                let mut row = json!({
                    "player_id": format!("p{index}"),
                    "season": season,
                    "week": week,
                });
                if index < with_metric {
                    row["offense_pct"] = json!(0.5);
                }
                row
            })
            .collect(),
    )
}
