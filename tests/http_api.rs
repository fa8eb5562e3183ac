use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use conflictd::api::{self, AppState};
use conflictd::engine::{CommitMode, Engine, NewEntry};
use conflictd::model::*;

// ── Test infrastructure ──────────────────────────────────────

const H: Ms = 3_600_000;
/// 2024-06-01T00:00:00Z
const JUNE_1: Ms = 1_717_200_000_000;

const CHEF: Id = 1;
const OVEN: Id = 2;
const SERVER: Id = 3;
const VAN: Id = 4;
const GALA: Id = 10;
const PLATING: Id = 100;

fn at(hour: i64) -> Ms {
    JUNE_1 + hour * H
}

fn unique_dir(prefix: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::temp_dir().join(format!(
        "{prefix}_{}_{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn start_test_server() -> (String, Arc<Engine>) {
    start_test_server_with(Duration::from_millis(250)).await
}

async fn start_test_server_with(query_timeout: Duration) -> (String, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let dir = unique_dir("conflictd_http_test");
    let engine = Arc::new(Engine::new(dir.join("schedule.wal")).unwrap());
    for (id, name, kind) in [
        (CHEF, "Chef", ResourceKind::Staff),
        (OVEN, "Oven", ResourceKind::Equipment),
        (SERVER, "Server", ResourceKind::Staff),
        (VAN, "Van", ResourceKind::Equipment),
    ] {
        engine
            .upsert_resource(Resource { id, name: name.into(), kind, active: true })
            .await
            .unwrap();
    }
    engine.upsert_event(CateringEvent { id: GALA, name: "Gala".into() }).await.unwrap();
    engine
        .upsert_task(Task { id: PLATING, event_id: GALA, title: "Plating".into() })
        .await
        .unwrap();

    let state = AppState::new(engine.clone(), query_timeout);
    tokio::spawn(api::serve(listener, state, std::future::pending()));

    (format!("http://{addr}"), engine)
}

async fn book(engine: &Engine, resource_id: Id, start: Ms, end: Ms) -> ScheduleEntry {
    engine
        .commit_assignment(
            vec![NewEntry {
                resource_id,
                event_id: GALA,
                task_id: Some(PLATING),
                start,
                end,
                note: None,
            }],
            None,
            CommitMode::Exclusive,
        )
        .await
        .unwrap()
        .remove(0)
}

async fn post_check(base: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}/conflicts/check"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ── POST /conflicts/check ────────────────────────────────────

#[tokio::test]
async fn check_reports_chef_double_booking() {
    let (base, engine) = start_test_server().await;
    let existing = book(&engine, CHEF, at(9), at(17)).await;

    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [CHEF],
            "start_time": "2024-06-01T13:00:00Z",
            "end_time": "2024-06-01T21:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], true);
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    let c = &conflicts[0];
    assert_eq!(c["resource_id"], CHEF);
    assert_eq!(c["resource_name"], "Chef");
    assert_eq!(c["conflicting_entry_id"], existing.id);
    assert_eq!(c["conflicting_event_id"], GALA);
    assert_eq!(c["conflicting_event_name"], "Gala");
    assert_eq!(c["conflicting_task_id"], PLATING);
    assert_eq!(c["conflicting_task_title"], "Plating");
    assert_eq!(c["existing_start_time"], "2024-06-01T09:00:00Z");
    assert_eq!(c["existing_end_time"], "2024-06-01T17:00:00Z");
    assert!(c["message"].as_str().unwrap().contains("Chef is already booked"));
}

#[tokio::test]
async fn check_unbooked_oven_is_clear() {
    let (base, _engine) = start_test_server().await;
    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [OVEN],
            "start_time": "2024-06-01T09:00:00Z",
            "end_time": "2024-06-01T17:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], false);
    assert!(body["conflicts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn check_back_to_back_shift_is_clear() {
    let (base, engine) = start_test_server().await;
    book(&engine, SERVER, at(9), at(12)).await;
    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [SERVER],
            "start_time": "2024-06-01T12:00:00Z",
            "end_time": "2024-06-01T17:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], false);
}

#[tokio::test]
async fn check_multi_resource_reports_only_chef() {
    let (base, engine) = start_test_server().await;
    book(&engine, CHEF, at(9), at(17)).await;
    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [CHEF, VAN],
            "start_time": "2024-06-01T10:00:00Z",
            "end_time": "2024-06-01T14:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 200);
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["resource_id"], CHEF);
}

#[tokio::test]
async fn check_excludes_entry_being_edited() {
    let (base, engine) = start_test_server().await;
    let existing = book(&engine, CHEF, at(9), at(17)).await;
    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [CHEF],
            "start_time": "2024-06-01T10:00:00Z",
            "end_time": "2024-06-01T18:00:00Z",
            "exclude_entry_id": existing.id
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], false);
}

#[tokio::test]
async fn check_accepts_offset_timestamps() {
    let (base, engine) = start_test_server().await;
    book(&engine, CHEF, at(9), at(17)).await;
    // 18:00+02:00 is 16:00Z, inside the booking.
    let (status, body) = post_check(
        &base,
        json!({
            "resource_ids": [CHEF],
            "start_time": "2024-06-01T18:00:00+02:00",
            "end_time": "2024-06-01T20:00:00+02:00"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], true);
}

#[tokio::test]
async fn check_rejects_malformed_queries() {
    let (base, _engine) = start_test_server().await;

    let cases = [
        json!({ "resource_ids": [], "start_time": "2024-06-01T09:00:00Z", "end_time": "2024-06-01T10:00:00Z" }),
        json!({ "resource_ids": [CHEF], "start_time": "2024-06-01T10:00:00Z", "end_time": "2024-06-01T10:00:00Z" }),
        json!({ "resource_ids": [CHEF], "start_time": "2024-06-01T11:00:00Z", "end_time": "2024-06-01T10:00:00Z" }),
        json!({ "resource_ids": [CHEF], "start_time": "tomorrow", "end_time": "2024-06-01T10:00:00Z" }),
        json!({ "resource_ids": [CHEF], "start_time": "2024-06-01T09:00:00Z" }),
        json!({ "resource_ids": ["chef"], "start_time": "2024-06-01T09:00:00Z", "end_time": "2024-06-01T10:00:00Z" }),
    ];
    for body in cases {
        let (status, err) = post_check(&base, body.clone()).await;
        assert_eq!(status, 400, "expected 400 for {body}");
        assert_eq!(err["error"], "validation");
        assert!(!err["message"].as_str().unwrap().is_empty());
    }
}

// ── GET /resources/{id}/availability ─────────────────────────

#[tokio::test]
async fn availability_lists_bookings_for_plain_dates() {
    let (base, engine) = start_test_server().await;
    let morning = book(&engine, CHEF, at(9), at(12)).await;
    let late = book(&engine, CHEF, at(22), at(26)).await;
    book(&engine, CHEF, at(48), at(50)).await;

    let (status, body) = get_json(&format!(
        "{base}/resources/{CHEF}/availability?start_date=2024-06-01&end_date=2024-06-01"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["resource_id"], CHEF);
    let entries = body["entries"].as_array().unwrap();
    let ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![morning.id, late.id]);
    assert_eq!(entries[0]["event_name"], "Gala");
    assert_eq!(entries[0]["task_title"], "Plating");
    assert_eq!(entries[0]["start_time"], "2024-06-01T09:00:00Z");
}

#[tokio::test]
async fn availability_accepts_timestamps() {
    let (base, engine) = start_test_server().await;
    book(&engine, VAN, at(9), at(12)).await;
    let (status, body) = get_json(&format!(
        "{base}/resources/{VAN}/availability?start_date=2024-06-01T12:00:00Z&end_date=2024-06-01T18:00:00Z"
    ))
    .await;
    assert_eq!(status, 200);
    assert!(body["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn availability_empty_for_unbooked_and_unknown() {
    let (base, _engine) = start_test_server().await;
    for id in [OVEN, 999] {
        let (status, body) = get_json(&format!(
            "{base}/resources/{id}/availability?start_date=2024-06-01&end_date=2024-06-02"
        ))
        .await;
        assert_eq!(status, 200);
        assert!(body["entries"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn availability_rejects_bad_bounds() {
    let (base, _engine) = start_test_server().await;
    for query in [
        "start_date=2024-06-01",
        "end_date=2024-06-01",
        "start_date=2024-06-03&end_date=2024-06-01",
        "start_date=June&end_date=2024-06-01",
    ] {
        let (status, err) =
            get_json(&format!("{base}/resources/{CHEF}/availability?{query}")).await;
        assert_eq!(status, 400, "expected 400 for {query}");
        assert_eq!(err["error"], "validation");
    }

    let resp = reqwest::get(format!(
        "{base}/resources/chef/availability?start_date=2024-06-01&end_date=2024-06-02"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

// ── Timeouts and store outages ───────────────────────────────

#[tokio::test]
async fn stuck_store_read_returns_504() {
    let (base, engine) = start_test_server_with(Duration::from_millis(50)).await;
    book(&engine, CHEF, at(9), at(17)).await;
    let body = json!({
        "resource_ids": [CHEF],
        "start_time": "2024-06-01T13:00:00Z",
        "end_time": "2024-06-01T21:00:00Z"
    });

    let timeline = engine.store.get_timeline(&CHEF).unwrap();
    let held = timeline.write_owned().await;

    let (status, err) = post_check(&base, body.clone()).await;
    assert_eq!(status, 504);
    assert_eq!(err["error"], "timeout");
    let (status, err) = get_json(&format!(
        "{base}/resources/{CHEF}/availability?start_date=2024-06-01&end_date=2024-06-01"
    ))
    .await;
    assert_eq!(status, 504);
    assert_eq!(err["error"], "timeout");

    drop(held);
    let (status, ok) = post_check(&base, body).await;
    assert_eq!(status, 200);
    assert_eq!(ok["has_conflicts"], true);
}

#[tokio::test]
async fn unreachable_store_returns_503() {
    // An engine whose log writer ran on a runtime that is gone.
    let dir = unique_dir("conflictd_http_down");
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let engine = {
        let _guard = rt.enter();
        Arc::new(Engine::new(dir.join("schedule.wal")).unwrap())
    };
    rt.shutdown_background();
    for _ in 0..100 {
        if !engine.store_reachable() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!engine.store_reachable());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(api::serve(
        listener,
        AppState::new(engine, Duration::from_millis(250)),
        std::future::pending(),
    ));

    let (status, err) = post_check(
        &base,
        json!({
            "resource_ids": [CHEF],
            "start_time": "2024-06-01T13:00:00Z",
            "end_time": "2024-06-01T21:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(err["error"], "store_unavailable");

    let (status, body) = get_json(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["store_reachable"], false);
}

// ── GET /health ──────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let (base, _engine) = start_test_server().await;
    let (status, body) = get_json(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store_reachable"], true);
}
