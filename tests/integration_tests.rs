//! Integration tests across the engine, persistent store, notifier and HTTP API.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use tiered_cache::cache::clock::ManualClock;
use tiered_cache::cache::codec::StoredValue;
use tiered_cache::metrics::CacheMetrics;
use tiered_cache::server::http_api::{build_router, AppState};
use tiered_cache::storage::{MemoryStore, PersistedRecord, PersistentStore};
use tiered_cache::{
    CacheEngine, CacheEvent, Config, Lookup, PriorityClass, SetOptions, SweepScheduler,
};

async fn open_with_store(
    config: Config,
    clock: &ManualClock,
    store: Arc<MemoryStore>,
) -> CacheEngine {
    let store: Arc<dyn PersistentStore> = store;
    CacheEngine::open_with(Arc::new(config), Arc::new(clock.clone()), Some(store))
        .await
        .unwrap()
}

// ─── Durability ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.persistence.durable = true;
    config.persistence.dir = dir.path().to_path_buf();
    let config = Arc::new(config);

    let engine = CacheEngine::open(config.clone()).await.unwrap();
    assert!(engine.is_durable());
    engine
        .set("standings", json!({"AL West": ["SEA", "HOU"]}), SetOptions::default())
        .await
        .unwrap();
    engine.set("gone", json!(1), SetOptions::default()).await.unwrap();
    engine.delete("gone").await;
    engine.shutdown().await;

    assert!(config.store_path().exists());

    let reopened = CacheEngine::open(config).await.unwrap();
    assert_eq!(
        reopened.get("standings").await,
        Lookup::Hit(json!({"AL West": ["SEA", "HOU"]}))
    );
    assert_eq!(reopened.get("gone").await, Lookup::Miss);
    reopened.shutdown().await;
}

#[tokio::test]
async fn test_restart_within_ttl_restores_entry() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());

    let engine = open_with_store(Config::default(), &clock, store.clone()).await;
    engine
        .set(
            "lineup",
            json!(["Crawford", "Rodriguez"]),
            SetOptions::default().with_ttl(Duration::from_secs(60)).with_tag("SEA"),
        )
        .await
        .unwrap();
    engine.shutdown().await;

    clock.advance(Duration::from_secs(30));
    let restarted = open_with_store(Config::default(), &clock, store.clone()).await;

    let info = restarted.peek("lineup").await.unwrap();
    assert_eq!(info.created_at, 0);
    assert_eq!(info.ttl_ms, 60_000);
    assert_eq!(info.tags, vec!["SEA".to_string()]);
    assert_eq!(
        restarted.get("lineup").await,
        Lookup::Hit(json!(["Crawford", "Rodriguez"]))
    );
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_restart_after_ttl_purges_entry() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());

    let engine = open_with_store(Config::default(), &clock, store.clone()).await;
    engine
        .set("box_score", json!({"R": 3}), SetOptions::default().with_ttl(Duration::from_secs(60)))
        .await
        .unwrap();
    engine.flush().await;
    assert!(store.contains("box_score").await);
    engine.shutdown().await;

    clock.advance(Duration::from_secs(61));
    let restarted = open_with_store(Config::default(), &clock, store.clone()).await;

    assert!(restarted.is_empty().await);
    assert_eq!(restarted.get("box_score").await, Lookup::Miss);
    restarted.flush().await;
    assert!(!store.contains("box_score").await);
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_compressed_entries_survive_restart() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());
    let mut config = Config::default();
    config.compression.enabled = true;

    let value = json!({"pitches": vec!["SL"; 400]});
    let engine = open_with_store(config.clone(), &clock, store.clone()).await;
    engine.set("pbp", value.clone(), SetOptions::default()).await.unwrap();
    engine.shutdown().await;

    let restarted = open_with_store(config, &clock, store).await;
    assert!(restarted.peek("pbp").await.unwrap().compressed);
    assert_eq!(restarted.get("pbp").await, Lookup::Hit(value));
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_store_mirrors_evictions_and_clear() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());
    let mut config = Config::default();
    config.cache.max_entries = 2;

    let engine = open_with_store(config, &clock, store.clone()).await;
    for key in ["a", "b", "c"] {
        engine.set(key, json!(key), SetOptions::default()).await.unwrap();
        clock.advance(Duration::from_millis(10));
    }
    engine.flush().await;
    assert_eq!(store.len().await, 2);
    assert!(!store.contains("a").await);

    engine.clear().await;
    engine.flush().await;
    assert_eq!(store.len().await, 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_huge_ttl_survives_restart() {
    let clock = ManualClock::new(1_000);
    let store = Arc::new(MemoryStore::new());

    let engine = open_with_store(Config::default(), &clock, store.clone()).await;
    engine
        .set(
            "season",
            json!(162),
            SetOptions::default().with_ttl(Duration::from_secs(1 << 62)),
        )
        .await
        .unwrap();
    assert_eq!(engine.peek("season").await.unwrap().ttl_ms, u64::MAX);
    engine.shutdown().await;

    let persisted = store.load_all().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].1.ttl_ms, u64::MAX);
    assert!(!persisted[0].1.is_expired(1_000 + 86_400_000));

    clock.advance(Duration::from_millis(1));
    let restarted = open_with_store(Config::default(), &clock, store.clone()).await;
    assert_eq!(restarted.get("season").await, Lookup::Hit(json!(162)));
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_entry_is_dropped_on_read() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryStore::new());
    let record = PersistedRecord {
        value: StoredValue::Zstd(Bytes::from_static(b"junk")),
        created_at: 0,
        ttl_ms: 60_000,
        priority_class: PriorityClass::Normal,
        tags: BTreeSet::new(),
        size_bytes: 4,
    };
    store.save("corrupt", &record).await.unwrap();

    let engine = open_with_store(Config::default(), &clock, store.clone()).await;
    assert!(engine.peek("corrupt").await.is_some());

    assert_eq!(engine.get("corrupt").await, Lookup::Miss);
    assert!(engine.peek("corrupt").await.is_none());

    engine.flush().await;
    assert!(!store.contains("corrupt").await);

    let stats = engine.stats().await;
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
    engine.shutdown().await;
}

// ─── Notifications ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscriber_sees_update_expire_and_evict() {
    let clock = ManualClock::new(0);
    let engine = CacheEngine::open_with(Arc::new(Config::default()), Arc::new(clock.clone()), None)
        .await
        .unwrap();

    let seen: Arc<Mutex<Vec<CacheEvent>>> = Arc::default();
    let sink = seen.clone();
    let subscription = engine.subscribe("odds", move |event| sink.lock().push(event.clone()));

    engine
        .set("odds", json!(1.5), SetOptions::default().with_ttl(Duration::from_secs(1)))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(2));
    engine.sweep().await;
    engine.set("odds", json!(2.0), SetOptions::default()).await.unwrap();
    engine.delete("odds").await;
    engine.set("other", json!(0), SetOptions::default()).await.unwrap();
    engine.flush().await;

    assert_eq!(
        *seen.lock(),
        vec![
            CacheEvent::Updated(json!(1.5)),
            CacheEvent::Expired,
            CacheEvent::Updated(json!(2.0)),
            CacheEvent::Evicted,
        ]
    );

    drop(subscription);
    engine.set("odds", json!(3.0), SetOptions::default()).await.unwrap();
    engine.flush().await;
    assert_eq!(seen.lock().len(), 4);
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_affect_others() {
    let engine = CacheEngine::open(Arc::new(Config::default())).await.unwrap();

    let seen: Arc<Mutex<Vec<CacheEvent>>> = Arc::default();
    let sink = seen.clone();
    let _bad = engine.subscribe("k", |_| panic!("subscriber bug"));
    let good = engine.subscribe("k", move |event| sink.lock().push(event.clone()));

    engine.set("k", json!("v"), SetOptions::default()).await.unwrap();
    engine.flush().await;
    assert_eq!(*seen.lock(), vec![CacheEvent::Updated(json!("v"))]);

    engine.unsubscribe(good);
    engine.set("k", json!("w"), SetOptions::default()).await.unwrap();
    engine.flush().await;
    assert_eq!(seen.lock().len(), 1);
}

// ─── Sweeping ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_tier_free_of_expired_entries() {
    let clock = ManualClock::new(0);
    let engine = Arc::new(
        CacheEngine::open_with(Arc::new(Config::default()), Arc::new(clock.clone()), None)
            .await
            .unwrap(),
    );
    for i in 0..10u64 {
        let ttl = Duration::from_secs(if i % 2 == 0 { 5 } else { 3_600 });
        engine
            .set(&format!("k{i}"), json!(i), SetOptions::default().with_ttl(ttl))
            .await
            .unwrap();
    }

    let handle = SweepScheduler::new(engine.clone(), Duration::from_secs(30)).spawn();
    clock.advance(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(engine.len().await, 5);
    assert!(engine.peek("k0").await.is_none());
    assert!(engine.peek("k1").await.is_some());
    handle.stop().await;
}

// ─── HTTP API ──────────────────────────────────────────────────────────────

fn test_router(engine: Arc<CacheEngine>) -> axum::Router {
    build_router(Arc::new(AppState {
        engine,
        metrics: CacheMetrics::new().unwrap(),
        start_time: Instant::now(),
    }))
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_http_entry_lifecycle() {
    let engine = Arc::new(CacheEngine::open(Arc::new(Config::default())).await.unwrap());
    let router = test_router(engine.clone());

    let (status, _) = send(
        &router,
        put_json(
            "/v1/cache/entries/standings",
            json!({"value": {"SEA": 90}, "ttl_secs": 60, "priority": "HIGH", "tags": ["AL"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, empty("GET", "/v1/cache/entries/standings")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"key": "standings", "value": {"SEA": 90}}));

    let info = engine.peek("standings").await.unwrap();
    assert_eq!(info.ttl_ms, 60_000);
    assert_eq!(info.hit_count, 1);

    let (status, _) = send(&router, empty("DELETE", "/v1/cache/entries/standings")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&router, empty("DELETE", "/v1/cache/entries/standings")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, empty("GET", "/v1/cache/entries/standings")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_force_fresh_and_tags() {
    let engine = Arc::new(CacheEngine::open(Arc::new(Config::default())).await.unwrap());
    let router = test_router(engine.clone());

    for key in ["p1", "p2"] {
        let (status, _) = send(
            &router,
            put_json(
                &format!("/v1/cache/entries/{key}"),
                json!({"value": key, "tags": ["pitcher"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    engine.set("b1", json!("b1"), SetOptions::default()).await.unwrap();

    let (status, _) = send(&router, empty("GET", "/v1/cache/entries/b1?force_fresh=true")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&router, empty("DELETE", "/v1/cache/tags/pitcher")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"deleted": 2}));
    assert!(engine.is_empty().await);
}

#[tokio::test]
async fn test_http_rejects_oversized_value() {
    let mut config = Config::default();
    config.cache.max_bytes = Some(32);
    let engine = Arc::new(CacheEngine::open(Arc::new(config)).await.unwrap());
    let router = test_router(engine);

    let (status, body) = send(
        &router,
        put_json("/v1/cache/entries/big", json!({"value": "x".repeat(100)})),
    )
    .await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("big"));
}

#[tokio::test]
async fn test_http_stats_sweep_clear_and_metrics() {
    let engine = Arc::new(CacheEngine::open(Arc::new(Config::default())).await.unwrap());
    let router = test_router(engine.clone());

    engine.set("a", json!(1), SetOptions::default()).await.unwrap();
    engine.get("a").await;
    engine.get("missing").await;

    let (status, body) = send(&router, empty("GET", "/v1/cache/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["entry_count"], 1);
    assert_eq!(stats["hit_rate"], 0.5);

    let (status, body) = send(&router, empty("GET", "/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("tiered_cache_hits 1"));
    assert!(text.contains("tiered_cache_entries 1"));

    let (status, body) = send(&router, empty("POST", "/v1/cache/sweep")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"expired": 0}));

    let (status, _) = send(&router, empty("POST", "/v1/cache/clear")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(engine.is_empty().await);

    let (status, body) = send(&router, empty("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["durable"], false);
    assert_eq!(health["cache"]["hits"], 0);
}
