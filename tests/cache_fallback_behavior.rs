mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use snapline_core::{
    CacheKey, CacheRecord, CacheStore, CircuitBreakerConfig, CircuitBreakerRegistry, DataKind,
    Entity, EntityId, EstimateTable, FallbackResolver, FetchErrorKind, FetchPipeline, FixedPeriod,
    HttpClient, HttpResponse, Position, PutOutcome, Quality, RecordSource, ResolvedSource,
    RetryExecutor, RetryPolicy, SnaplineConfig, SnaplineService, SourceTag, ValidationOutcome,
};
use time::OffsetDateTime;

use support::{period, shared, snap_rows, ScriptedHttpClient, ScriptedSource};

fn player(id: &str, position: Position, rank: Option<u8>) -> Entity {
    let entity = Entity::new(EntityId::parse(id).expect("valid id"), position);
    match rank {
        Some(rank) => entity.with_depth_rank(rank),
        None => entity,
    }
}

fn snap_key(id: &str, week: u8) -> CacheKey {
    CacheKey::new(EntityId::parse(id).expect("valid id"), period(2024, week), DataKind::SnapPct)
}

fn pipeline(store: Arc<CacheStore>, attempts: u32) -> FetchPipeline {
    let executor = RetryExecutor::new(
        Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        RetryPolicy::fixed(Duration::ZERO, attempts),
    );
    FetchPipeline::new(Arc::new(executor), store)
}

// ============================================================================
// Cache write precedence
// ============================================================================

#[test]
fn estimates_never_replace_observed_records() {
    let store = CacheStore::new();
    let key = snap_key("77", 8);

    assert_eq!(
        store.put(key.clone(), CacheRecord::upstream(json!(61.5), Quality::Full)),
        PutOutcome::Inserted
    );
    assert_eq!(
        store.put(key.clone(), CacheRecord::estimated(json!(70.0))),
        PutOutcome::Skipped
    );

    let record = store.get(&key).expect("record present");
    assert_eq!(record.value, json!(61.5));
    assert_eq!(record.source, RecordSource::Upstream);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_estimate_writes_never_displace_an_observed_record() {
    for round in 0..50 {
        // Given eight writers released together, one of them observed
        let store = Arc::new(CacheStore::new());
        let key = snap_key("77", 8);
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let writers = (0..8)
            .map(|writer| {
                let store = Arc::clone(&store);
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    let record = if writer == round % 8 {
                        CacheRecord::upstream(json!(61.5), Quality::Full)
                    } else {
                        CacheRecord::estimated(json!(70.0))
                    };
                    store.put(key, record);
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.await.expect("writer finished");
        }

        // Then the observed record survives whatever the interleaving
        let record = store.get(&key).expect("record present");
        assert_eq!(record.source, RecordSource::Upstream, "round {round}");
        assert_eq!(record.value, json!(61.5));
    }
}

#[test]
fn observed_records_replace_estimates() {
    let store = CacheStore::new();
    let key = snap_key("77", 8);

    store.put(key.clone(), CacheRecord::estimated(json!(70.0)));
    let outcome = store.put(key.clone(), CacheRecord::computed(json!(66.7), Quality::Partial));

    assert_eq!(outcome, PutOutcome::Replaced);
    assert_eq!(store.get(&key).expect("present").source, RecordSource::Computed);
}

// ============================================================================
// Fallback chain
// ============================================================================

#[test]
fn prior_period_is_served_when_the_exact_period_is_missing() {
    // Given only last week's snap share for player 77
    let store = Arc::new(CacheStore::new());
    store.put(snap_key("77", 7), CacheRecord::upstream(json!(64.0), Quality::Full));
    let resolver = FallbackResolver::new(store, EstimateTable::standard());

    // When week 8 is resolved
    let resolution = resolver
        .resolve_cached(&player("77", Position::Rb, Some(1)), period(2024, 8), DataKind::SnapPct)
        .expect("prior tier hit");

    // Then last week's value is returned and tagged as such
    assert_eq!(resolution.value, json!(64.0));
    assert_eq!(resolution.source, ResolvedSource::PriorPeriod);
    assert_eq!(resolution.quality, Some(Quality::Full));
}

#[test]
fn depth_chart_estimate_is_the_last_resort() {
    let store = Arc::new(CacheStore::new());
    let resolver = FallbackResolver::new(Arc::clone(&store), EstimateTable::standard())
        .with_cached_estimates(true);
    let rb1 = player("77", Position::Rb, Some(1));

    let resolution = resolver
        .resolve_cached(&rb1, period(2024, 8), DataKind::SnapPct)
        .expect("estimate tier hit");

    assert_eq!(resolution.value, json!(70.0));
    assert_eq!(resolution.source, ResolvedSource::Estimated);
    assert_eq!(resolution.age, None);

    // The cached estimate does not masquerade as observed data next time.
    let cached = store.get(&snap_key("77", 8)).expect("estimate cached");
    assert_eq!(cached.source, RecordSource::Estimated);
    let again = resolver
        .resolve_cached(&rb1, period(2024, 8), DataKind::SnapPct)
        .expect("estimate tier hit");
    assert_eq!(again.source, ResolvedSource::Estimated);
}

#[test]
fn exact_period_wins_over_prior_and_estimate() {
    let store = Arc::new(CacheStore::new());
    store.put(snap_key("77", 7), CacheRecord::upstream(json!(64.0), Quality::Full));
    store.put(snap_key("77", 8), CacheRecord::upstream(json!(58.3), Quality::Partial));
    let resolver = FallbackResolver::new(store, EstimateTable::standard());

    let resolution = resolver
        .resolve_cached(&player("77", Position::Rb, Some(1)), period(2024, 8), DataKind::SnapPct)
        .expect("exact tier hit");

    assert_eq!(resolution.value, json!(58.3));
    assert_eq!(resolution.source, ResolvedSource::Exact);
    assert_eq!(resolution.quality, Some(Quality::Partial));
}

#[test]
fn stale_exact_record_falls_through_to_the_prior_period() {
    let store = Arc::new(CacheStore::new());
    let stale = OffsetDateTime::now_utc() - time::Duration::days(5);
    store.put(
        snap_key("77", 8),
        CacheRecord::upstream(json!(58.3), Quality::Full).with_fetched_at(stale),
    );
    store.put(snap_key("77", 7), CacheRecord::upstream(json!(64.0), Quality::Full));
    let resolver = FallbackResolver::new(store, EstimateTable::standard());

    let resolution = resolver
        .resolve_cached(&player("77", Position::Rb, Some(1)), period(2024, 8), DataKind::SnapPct)
        .expect("prior tier hit");

    assert_eq!(resolution.source, ResolvedSource::PriorPeriod);
}

#[test]
fn unknown_rank_without_cache_resolves_to_nothing() {
    let resolver = FallbackResolver::new(Arc::new(CacheStore::new()), EstimateTable::standard());

    assert!(resolver
        .resolve_cached(&player("77", Position::Rb, None), period(2024, 8), DataKind::SnapPct)
        .is_none());
}

// ============================================================================
// Validation gating
// ============================================================================

#[tokio::test]
async fn invalid_payloads_are_never_cached() {
    // Given an endpoint that returns an object where a list is expected
    let store = Arc::new(CacheStore::new());
    let pipeline = pipeline(Arc::clone(&store), 2);
    let source = ScriptedSource::always_ok("snap-counts", DataKind::SnapPct, json!({ "error": "x" }));

    // When the pipeline refreshes it
    let error = pipeline
        .refresh(&source, period(2024, 8), None)
        .await
        .expect_err("payload rejected");

    // Then the rejection was retried and nothing reached the cache
    assert_eq!(error.kind(), FetchErrorKind::Rejected);
    assert_eq!(source.calls(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn low_coverage_payloads_are_cached_as_partial() {
    // Given 100 records of which 20 carry a snap share
    let store = Arc::new(CacheStore::new());
    let pipeline = pipeline(Arc::clone(&store), 1);
    let source = ScriptedSource::always_ok(
        "snap-counts",
        DataKind::SnapPct,
        snap_rows(2024, 8, 100, 20),
    );

    // When the pipeline refreshes
    let report = pipeline
        .refresh(&source, period(2024, 8), None)
        .await
        .expect("warning payloads are cacheable");

    // Then the batch is a warning at 20% coverage and cached as partial
    assert_eq!(report.outcome, ValidationOutcome::ValidWithWarning);
    let coverage = report.coverage.expect("coverage measured");
    assert!((coverage - 0.2).abs() < 1e-9);
    assert_eq!(report.records_written, 20);

    let record = store.get(&snap_key("p0", 8)).expect("record cached");
    assert_eq!(record.quality, Some(Quality::Partial));
    assert_eq!(record.value, json!(50.0));
    assert!(store.get(&snap_key("p50", 8)).is_none());
}

#[tokio::test]
async fn a_rejected_payload_is_retried_until_a_valid_one_arrives() {
    let store = Arc::new(CacheStore::new());
    let pipeline = pipeline(Arc::clone(&store), 3);
    let source = ScriptedSource::always_ok(
        "snap-counts",
        DataKind::SnapPct,
        snap_rows(2024, 8, 10, 10),
    )
    .then(Ok(json!([])));

    let report = pipeline
        .refresh(&source, period(2024, 8), None)
        .await
        .expect("second attempt is valid");

    assert_eq!(source.calls(), 2);
    assert_eq!(report.outcome, ValidationOutcome::Valid);
    assert_eq!(report.records_written, 10);
    assert_eq!(
        store.get(&snap_key("p9", 8)).expect("cached").quality,
        Some(Quality::Full)
    );
}

#[tokio::test]
async fn record_cap_bounds_each_refresh() {
    let store = Arc::new(CacheStore::new());
    let pipeline = pipeline(Arc::clone(&store), 1);
    let source = ScriptedSource::always_ok(
        "snap-counts",
        DataKind::SnapPct,
        snap_rows(2024, 8, 10, 10),
    );

    let report = pipeline
        .refresh(&source, period(2024, 8), Some(4))
        .await
        .expect("refresh succeeds");

    assert_eq!(report.records_written, 4);
    assert_eq!(report.records_capped, 6);
    assert_eq!(store.len(), 4);
}

// ============================================================================
// Service boundary
// ============================================================================

#[tokio::test]
async fn a_full_miss_fetches_on_demand_through_the_service() {
    // Given an empty cache and a stats upstream serving week 8 snap counts
    let client = shared(ScriptedHttpClient::new().route(
        "/snap-counts/2024/8",
        Ok(HttpResponse::ok_json(snap_rows(2024, 8, 5, 5).to_string())),
    ));
    let transport: Arc<dyn HttpClient> = client.clone();
    let service = SnaplineService::builder(SnaplineConfig::default())
        .with_http_client(transport)
        .with_period_provider(Arc::new(FixedPeriod(period(2024, 8))))
        .build()
        .expect("service builds");

    // When a player with no estimate row is requested
    let outcome = service
        .fetch(&player("p3", Position::Wr, None), period(2024, 8), DataKind::SnapPct)
        .await;

    // Then the value comes from the freshly fetched exact period
    assert_eq!(outcome.source_tag, SourceTag::Exact);
    assert_eq!(outcome.value, Some(json!(50.0)));
    assert_eq!(client.calls_to("/snap-counts/2024/8"), 1);
    assert_eq!(service.store().len(), 5);
}

#[tokio::test]
async fn without_on_demand_fetch_a_full_miss_is_absent() {
    let client = shared(ScriptedHttpClient::new());
    let transport: Arc<dyn HttpClient> = client.clone();
    let service = SnaplineService::builder(SnaplineConfig::default())
        .with_http_client(transport)
        .with_period_provider(Arc::new(FixedPeriod(period(2024, 8))))
        .with_on_demand_fetch(false)
        .build()
        .expect("service builds");

    let outcome = service
        .fetch(&player("p3", Position::Wr, None), period(2024, 8), DataKind::SnapPct)
        .await;

    assert!(outcome.is_absent());
    assert_eq!(outcome.source_tag, SourceTag::Absent);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn foreground_misses_after_a_prefetch_stay_off_the_upstream() {
    // Given a prefetched week 8 that reports three players
    let client = shared(
        ScriptedHttpClient::new()
            .route("/snap-counts/", Ok(HttpResponse::ok_json(snap_rows(2024, 8, 3, 3).to_string())))
            .route("/", Ok(HttpResponse::with_status(404, ""))),
    );
    let transport: Arc<dyn HttpClient> = client.clone();
    let service = SnaplineService::builder(SnaplineConfig::default())
        .with_http_client(transport)
        .with_period_provider(Arc::new(FixedPeriod(period(2024, 8))))
        .build()
        .expect("service builds");
    service.prefetch_once().await;
    assert_eq!(client.calls_to("/snap-counts/2024/8"), 1);

    // When a kicker and an unreported receiver are requested repeatedly
    for _ in 0..5 {
        let kicker = service
            .fetch(&player("k1", Position::K, None), period(2024, 8), DataKind::SnapPct)
            .await;
        let unreported = service
            .fetch(&player("p99", Position::Wr, None), period(2024, 8), DataKind::SnapPct)
            .await;
        assert!(kicker.is_absent());
        assert!(unreported.is_absent());
    }

    // Then the upstream was not called again
    assert_eq!(client.calls_to("/snap-counts/2024/8"), 1);
    let reported = service
        .fetch(&player("p2", Position::Wr, None), period(2024, 8), DataKind::SnapPct)
        .await;
    assert_eq!(reported.source_tag, SourceTag::Exact);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_upstream_fetch() {
    let client = shared(ScriptedHttpClient::new().route(
        "/snap-counts/2024/8",
        Ok(HttpResponse::ok_json(snap_rows(2024, 8, 5, 5).to_string())),
    ));
    let transport: Arc<dyn HttpClient> = client.clone();
    let service = Arc::new(
        SnaplineService::builder(SnaplineConfig::default())
            .with_http_client(transport)
            .with_period_provider(Arc::new(FixedPeriod(period(2024, 8))))
            .build()
            .expect("service builds"),
    );

    let readers = (0..8)
        .map(|reader| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let id = format!("p{}", reader % 5);
                service
                    .fetch(&player(&id, Position::Wr, None), period(2024, 8), DataKind::SnapPct)
                    .await
            })
        })
        .collect::<Vec<_>>();

    for reader in readers {
        let outcome = reader.await.expect("reader finished");
        assert_eq!(outcome.source_tag, SourceTag::Exact);
    }
    assert_eq!(client.calls_to("/snap-counts/2024/8"), 1);
}

#[tokio::test(start_paused = true)]
async fn a_stale_record_is_served_when_the_upstream_is_down() {
    // Given a ten-day-old snap share and an unreachable upstream
    let client = shared(ScriptedHttpClient::new());
    let transport: Arc<dyn HttpClient> = client.clone();
    let service = SnaplineService::builder(SnaplineConfig::default())
        .with_http_client(transport)
        .with_period_provider(Arc::new(FixedPeriod(period(2024, 8))))
        .build()
        .expect("service builds");
    let old = OffsetDateTime::now_utc() - time::Duration::days(10);
    service.store().put(
        snap_key("p1", 8),
        CacheRecord::upstream(json!(58.3), Quality::Full).with_fetched_at(old),
    );

    // When the fact is requested
    let outcome = service
        .fetch(&player("p1", Position::Wr, None), period(2024, 8), DataKind::SnapPct)
        .await;

    // Then the on-demand fetch was tried and the old value comes back tagged stale
    assert!(client.calls_to("/snap-counts/2024/8") >= 1);
    assert_eq!(outcome.source_tag, SourceTag::Stale);
    assert_eq!(outcome.value, Some(json!(58.3)));
    assert_eq!(outcome.quality, Some(Quality::Full));
    assert!(outcome.age_seconds.is_some_and(|age| age >= 10 * 24 * 3600 - 60));
}
