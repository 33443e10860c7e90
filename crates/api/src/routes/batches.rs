//! Operator routes over notification batch outcomes.
//!
//! Failed batches carry the error message recorded at delivery time, so an
//! operator can see why a user never received a notification.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{BatchStatus, NotificationBatch};
use courier_store::batch::BatchService;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/batches", get(list_batches))
        .route("/api/admin/batches/{id}", get(get_batch))
}

/// Query parameters for the batch listing.
#[derive(Debug, Deserialize)]
pub struct ListBatchesQuery {
    pub status: Option<BatchStatus>,
    pub limit: Option<i64>,
}

/// A batch with its ordered post ids.
#[derive(Debug, Serialize)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: NotificationBatch,
    pub post_ids: Vec<Uuid>,
}

/// GET /api/admin/batches — Recent batches, optionally filtered by status.
async fn list_batches(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListBatchesQuery>,
) -> Result<Json<Vec<NotificationBatch>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let batches = BatchService::list_recent(&state.pool, query.status, limit).await?;
    Ok(Json(batches))
}

/// GET /api/admin/batches/:id — A single batch with its post ids.
async fn get_batch(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchDetail>, AppError> {
    let batch = BatchService::get(&state.pool, id).await?;
    let post_ids = BatchService::post_ids(&state.pool, id).await?;
    Ok(Json(BatchDetail { batch, post_ids }))
}
