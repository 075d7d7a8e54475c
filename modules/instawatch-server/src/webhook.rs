use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use instagram_client::id_to_string;
use instawatch_core::{PollError, RealTimePoller, TriggerDecision};

/// One entry of a notification POST. Other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct Notification {
    subscription_id: Value,
}

pub fn router(poller: Arc<RealTimePoller>, route: &str) -> Router {
    Router::new()
        .route(route, get(verify).post(notify))
        .with_state(poller)
        // Path only; the challenge query string is not logged.
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "webhook",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Subscription verification: echo `hub.challenge`.
async fn verify(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("hub.challenge") {
        Some(challenge) => (StatusCode::OK, challenge.clone()),
        None => (StatusCode::BAD_REQUEST, "missing hub.challenge".to_string()),
    }
}

/// Forward every notified subscription id to the coalescer and return at once.
async fn notify(
    State(poller): State<Arc<RealTimePoller>>,
    Json(notifications): Json<Vec<Notification>>,
) -> StatusCode {
    for notification in notifications {
        let Some(subscription_id) = id_to_string(&notification.subscription_id)
            .and_then(|id| id.parse::<u64>().ok())
        else {
            warn!(raw = %notification.subscription_id, "Ignoring notification without a numeric subscription id");
            continue;
        };

        match poller.handle_trigger(subscription_id) {
            Ok(TriggerDecision::Poll { index }) => debug!(subscription_id, index, "Polling"),
            Ok(TriggerDecision::Coalesced { index }) => debug!(subscription_id, index, "Coalesced"),
            // Deletion already spawned.
            Err(PollError::UnknownSubscription(_)) => {}
            Err(e) => warn!(subscription_id, error = %e, "Trigger rejected"),
        }
    }
    StatusCode::OK
}
