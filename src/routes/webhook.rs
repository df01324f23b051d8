use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::{actions, extract, Decision, NewActionRecord, RawAlert, WebhookPayload, WebhookResponse};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/grafana/webhook", post(handler))
}

/// Handle one Grafana delivery.
///
/// Alerts are processed in order. A confirmed alert is claimed for its
/// episode before anything is written, so a redelivery (or a concurrent
/// delivery) of the same still-firing alert cannot produce a second action.
/// All actions from one delivery are written in one transaction; if that
/// fails the claims are released and the request fails so Grafana retries.
async fn handler(
    State((store, manager)): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    // ---
    let received = payload.alerts.len();
    info!(received, "POST /grafana/webhook");

    let mut claimed: Vec<(String, DateTime<Utc>)> = Vec::new();
    let mut records: Vec<NewActionRecord> = Vec::new();

    for (i, raw) in payload.alerts.into_iter().enumerate() {
        let alert = match serde_json::from_value::<RawAlert>(raw) {
            Ok(alert) => alert,
            Err(e) => {
                warn!("Skipping alert {} of {}: unreadable entry: {}", i, received, e);
                continue;
            }
        };

        let event = extract::to_event(&alert);
        debug!(
            uid = %event.uid,
            status = event.status.as_str(),
            value = ?event.value,
            threshold = ?event.threshold,
            "Alert '{}'",
            event.title
        );

        let decision = manager.process(
            &event.uid,
            &event.title,
            event.threshold,
            event.value,
            event.status,
        );
        debug!(uid = %event.uid, should_act = decision.should_act(), "Alert '{}'", event.title);

        let Decision::Act {
            started_at,
            sustained,
        } = decision
        else {
            continue;
        };

        if !manager.claim_action(&event.uid, started_at) {
            info!(
                uid = %event.uid,
                "Action already written for this alert episode - skipping duplicate"
            );
            continue;
        }

        let action = actions::action_for(&event.title).into_owned();
        claimed.push((event.uid.clone(), started_at));
        records.push(NewActionRecord {
            alert_uid: event.uid,
            alert_title: event.title,
            state: event.status,
            threshold: event.threshold,
            current_value: event.value,
            started_at,
            sustained_seconds: sustained.num_seconds(),
            action,
        });
    }

    if !records.is_empty() {
        if let Err(e) = store.insert_actions(&records).await {
            error!("Failed to store {} action(s): {}", records.len(), e);
            for (uid, started_at) in &claimed {
                manager.release_action(uid, *started_at);
            }
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to store actions" })),
            )
                .into_response();
        }
        for record in &records {
            info!(uid = %record.alert_uid, "Action recorded for '{}'", record.alert_title);
        }
    }

    let actions_taken = records.into_iter().map(|r| r.action).collect();
    (
        StatusCode::OK,
        Json(WebhookResponse {
            received,
            actions_taken,
        }),
    )
        .into_response()
}
