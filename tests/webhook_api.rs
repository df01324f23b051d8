//! Webhook and health endpoints over the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sensorloop::{routes, AlertDurationManager, ManualClock, MemoryEventStore};

// ---

struct Harness {
    app: Router,
    store: Arc<MemoryEventStore>,
    clock: Arc<ManualClock>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
}

fn harness() -> Harness {
    // ---
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryEventStore::new(clock.clone()));
    let manager = Arc::new(AlertDurationManager::new(Duration::seconds(20), clock.clone()));
    let app = routes::router(store.clone(), manager);
    Harness { app, store, clock }
}

fn alert(fingerprint: &str, title: &str, status: &str, value: f64) -> Value {
    json!({
        "status": status,
        "fingerprint": fingerprint,
        "labels": {"alertname": title},
        "values": {"B": value, "C": 1},
        "annotations": {"summary": title, "threshold": "26"}
    })
}

fn delivery(alerts: Vec<Value>) -> Value {
    json!({ "alerts": alerts })
}

async fn post(app: &Router, body: Value) -> (StatusCode, Value) {
    // ---
    let request = Request::builder()
        .method("POST")
        .uri("/grafana/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

const TITLE: &str = "Kabinentemperatur zu hoch";

#[tokio::test]
async fn health_reports_duration_requirement() {
    // ---
    let h = harness();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json, json!({"status": "ok", "duration_requirement": 20}));
}

#[tokio::test]
async fn sustained_alert_records_exactly_one_action() {
    // ---
    let h = harness();
    let firing = || delivery(vec![alert("fp-1", TITLE, "firing", 27.9)]);

    let (status, body) = post(&h.app, firing()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": 1, "actions_taken": []}));

    h.clock.advance(Duration::seconds(10));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"], json!([]));

    h.clock.advance(Duration::seconds(11));
    let (_, body) = post(&h.app, firing()).await;
    let taken = body["actions_taken"].as_array().unwrap();
    assert_eq!(taken.len(), 1);
    assert!(taken[0].as_str().unwrap().starts_with("ENTSCHEIDUNG: Kühlprotokoll aktiviert"));

    // Still firing and still confirmed, but already actioned.
    h.clock.advance(Duration::seconds(10));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"], json!([]));

    let actions = h.store.actions();
    assert_eq!(actions.len(), 1);
    let record = &actions[0].record;
    assert_eq!(record.alert_uid, "fp-1");
    assert_eq!(record.alert_title, TITLE);
    assert_eq!(record.state.as_str(), "firing");
    assert_eq!(record.threshold, Some(26.0));
    assert_eq!(record.current_value, Some(27.9));
    assert_eq!(record.started_at, t0());
    assert_eq!(record.sustained_seconds, 21);
}

#[tokio::test]
async fn normal_starts_a_new_episode() {
    // ---
    let h = harness();
    let firing = || delivery(vec![alert("fp-1", TITLE, "firing", 27.9)]);

    post(&h.app, firing()).await;
    h.clock.advance(Duration::seconds(25));
    post(&h.app, firing()).await;
    assert_eq!(h.store.actions().len(), 1);

    post(&h.app, delivery(vec![alert("fp-1", TITLE, "normal", 24.1)])).await;

    h.clock.advance(Duration::seconds(5));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"], json!([]));

    h.clock.advance(Duration::seconds(20));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"].as_array().unwrap().len(), 1);
    assert_eq!(h.store.actions().len(), 2);
}

#[tokio::test]
async fn duplicates_within_one_delivery_act_once() {
    // ---
    let h = harness();
    post(&h.app, delivery(vec![alert("fp-1", TITLE, "firing", 27.9)])).await;
    h.clock.advance(Duration::seconds(30));

    let (_, body) = post(
        &h.app,
        delivery(vec![
            alert("fp-1", TITLE, "firing", 27.9),
            alert("fp-1", TITLE, "firing", 28.0),
        ]),
    )
    .await;
    assert_eq!(body["received"], 2);
    assert_eq!(body["actions_taken"].as_array().unwrap().len(), 1);
    assert_eq!(h.store.actions().len(), 1);
}

#[tokio::test]
async fn unreadable_entries_do_not_abort_the_batch() {
    // ---
    let h = harness();
    let no_value = json!({
        "status": "firing",
        "fingerprint": "fp-2",
        "annotations": {"summary": "Ölstand zu niedrig"}
    });
    let bad_labels = json!({"labels": "oops", "fingerprint": "fp-3", "status": "normal"});
    let batch = delivery(vec![json!(42), bad_labels, no_value.clone()]);

    let (status, body) = post(&h.app, batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 3);

    // The value-less alert is still debounced and acted on.
    h.clock.advance(Duration::seconds(20));
    let (_, body) = post(&h.app, delivery(vec![no_value])).await;
    assert_eq!(body["actions_taken"], json!(["Alarm: Ölstand zu niedrig"]));

    let record = &h.store.actions()[0].record;
    assert_eq!(record.current_value, None);
    assert_eq!(record.threshold, None);
}

#[tokio::test]
async fn normal_with_malformed_field_still_resets_episode() {
    // ---
    let h = harness();
    let firing = || delivery(vec![alert("fp-1", TITLE, "firing", 27.9)]);

    post(&h.app, firing()).await;
    h.clock.advance(Duration::seconds(21));
    post(&h.app, firing()).await;
    assert_eq!(h.store.actions().len(), 1);

    h.clock.advance(Duration::seconds(2));
    let normal = json!({
        "status": "normal",
        "fingerprint": "fp-1",
        "labels": null,
        "values": {"B": 24.1},
        "annotations": {"summary": TITLE}
    });
    let (status, body) = post(&h.app, delivery(vec![normal])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 1);

    // t=25 opens a fresh episode, t=50 confirms it.
    h.clock.advance(Duration::seconds(2));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"], json!([]));

    h.clock.advance(Duration::seconds(25));
    let (_, body) = post(&h.app, firing()).await;
    assert_eq!(body["actions_taken"].as_array().unwrap().len(), 1);
    assert_eq!(h.store.actions().len(), 2);
    assert_eq!(h.store.actions()[1].record.sustained_seconds, 25);
}

#[tokio::test]
async fn failed_write_fails_request_and_allows_retry() {
    // ---
    let h = harness();
    let firing = || delivery(vec![alert("fp-1", TITLE, "firing", 27.9)]);
    post(&h.app, firing()).await;
    h.clock.advance(Duration::seconds(21));

    h.store.fail_next_writes(1);
    let (status, body) = post(&h.app, firing()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(h.store.actions().is_empty());

    // Grafana redelivers; the released claim lets it act.
    let (status, body) = post(&h.app, firing()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions_taken"].as_array().unwrap().len(), 1);
    assert_eq!(h.store.actions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_record_one_action() {
    // ---
    let h = harness();
    post(&h.app, delivery(vec![alert("fp-1", TITLE, "firing", 27.9)])).await;
    h.clock.advance(Duration::seconds(30));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move {
                post(&app, delivery(vec![alert("fp-1", TITLE, "firing", 28.2)])).await
            })
        })
        .collect();

    let mut taken = 0;
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        taken += body["actions_taken"].as_array().unwrap().len();
    }
    assert_eq!(taken, 1);
    assert_eq!(h.store.actions().len(), 1);
}
