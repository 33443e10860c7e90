//! Push subscription routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use courier_common::error::AppError;
use courier_store::subscription::{SubscriptionService, UpsertSubscriptionParams};

use crate::middleware::auth::OptionalAuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/push/vapid-public-key", get(vapid_public_key))
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
}

/// Request body for subscribe: the browser's `PushSubscription.toJSON()`
/// wrapped in a `subscription` field.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: UpsertSubscriptionParams,
}

/// Request body for unsubscribe.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// Response for subscribe/unsubscribe.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub success: bool,
    pub message: String,
}

/// GET /api/push/vapid-public-key — The key browsers subscribe with.
async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let public_key = state
        .config
        .vapid_public_key
        .clone()
        .ok_or_else(|| AppError::Config("VAPID public key is not configured".to_string()))?;

    Ok(Json(serde_json::json!({ "publicKey": public_key })))
}

/// POST /api/push/subscribe — Create or replace the caller's push
/// subscription. Signed-in callers keep a single subscription row;
/// anonymous callers get a fresh one.
async fn subscribe(
    State(state): State<AppState>,
    OptionalAuthUser(auth): OptionalAuthUser,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<PushResponse>, AppError> {
    let user_id = auth.map(|a| a.user_id);
    SubscriptionService::upsert(&state.pool, user_id, &req.subscription).await?;

    Ok(Json(PushResponse {
        success: true,
        message: "Subscription saved".to_string(),
    }))
}

/// POST /api/push/unsubscribe — Remove the caller's subscription for an
/// endpoint.
async fn unsubscribe(
    State(state): State<AppState>,
    OptionalAuthUser(auth): OptionalAuthUser,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<PushResponse>, AppError> {
    let user_id = auth.map(|a| a.user_id);
    let deleted =
        SubscriptionService::delete_by_endpoint(&state.pool, user_id, &req.endpoint).await?;

    if deleted {
        Ok(Json(PushResponse {
            success: true,
            message: "Subscription removed".to_string(),
        }))
    } else {
        Err(AppError::NotFound(
            "No subscription found for that endpoint".to_string(),
        ))
    }
}
