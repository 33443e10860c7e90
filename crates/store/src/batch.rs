//! Notification batch service — persistence and the delivery state machine.
//!
//! A batch is created `pending` by the feed-ingestion process and is mutated
//! exactly once, by the scheduler's delivery attempt: `pending -> sent` or
//! `pending -> failed`. Both transitions are a single conditional UPDATE, so
//! two racing schedulers get exactly one winner; the loser observes
//! `AppError::InvalidTransition` and must leave the batch alone.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    BatchStatus, BatchType, DueBatch, NotificationBatch, PostSummary,
};

/// Service layer for notification batch storage and transitions.
pub struct BatchService;

/// Parameters for creating a new notification batch.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateBatchParams {
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub post_ids: Vec<Uuid>,
    pub batch_type: BatchType,
    pub scheduled_for: DateTime<Utc>,
}

/// Row shape of the due-batch scan before post hydration.
#[derive(Debug, sqlx::FromRow)]
struct DueBatchRow {
    id: Uuid,
    user_id: Uuid,
    feed_id: Uuid,
    post_count: i32,
    batch_type: BatchType,
    scheduled_for: DateTime<Utc>,
    status: BatchStatus,
    sent_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    email: String,
    username: String,
    feed_name: String,
}

impl BatchService {
    /// Create a new pending batch.
    ///
    /// `post_ids` are deduplicated preserving first-occurrence order, which is
    /// also the order posts are hydrated back in. An empty post set is
    /// rejected. `post_count` always equals the deduplicated size.
    pub async fn create(
        pool: &PgPool,
        params: &CreateBatchParams,
    ) -> Result<NotificationBatch, AppError> {
        let post_ids = dedup_post_ids(&params.post_ids);
        if post_ids.is_empty() {
            return Err(AppError::Validation(
                "Batch must reference at least one post".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let mut tx = pool.begin().await?;

        let batch: NotificationBatch = sqlx::query_as(
            r#"
            INSERT INTO notification_batches (id, user_id, feed_id, post_count, batch_type, scheduled_for, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(params.user_id)
        .bind(params.feed_id)
        .bind(post_ids.len() as i32)
        .bind(params.batch_type.to_string())
        .bind(params.scheduled_for)
        .bind(BatchStatus::Pending.to_string())
        .fetch_one(&mut *tx)
        .await?;

        for (position, post_id) in post_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO notification_batch_posts (batch_id, post_id, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(id)
            .bind(post_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            user_id = %params.user_id,
            feed_id = %params.feed_id,
            post_count = post_ids.len(),
            batch_type = %params.batch_type,
            "Notification batch created"
        );

        Ok(batch)
    }

    /// Get a single batch by ID.
    pub async fn get(pool: &PgPool, batch_id: Uuid) -> Result<NotificationBatch, AppError> {
        let batch: NotificationBatch =
            sqlx::query_as("SELECT * FROM notification_batches WHERE id = $1")
                .bind(batch_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", batch_id)))?;

        Ok(batch)
    }

    /// The batch's post ids in inclusion order.
    pub async fn post_ids(pool: &PgPool, batch_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT post_id FROM notification_batch_posts WHERE batch_id = $1 ORDER BY position ASC",
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Find batches that are due for delivery: still pending and scheduled at
    /// or before `now`.
    ///
    /// Each batch is hydrated with the owning user's email and username, the
    /// feed's display name, and the referenced posts' display fields in batch
    /// inclusion order. Results are ordered by `scheduled_for` then id, so
    /// delivery order is stable within a call.
    pub async fn find_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<DueBatch>, AppError> {
        let rows: Vec<DueBatchRow> = sqlx::query_as(
            r#"
            SELECT b.id, b.user_id, b.feed_id, b.post_count, b.batch_type,
                   b.scheduled_for, b.status, b.sent_at, b.error_message, b.created_at,
                   u.email, u.username, f.name AS feed_name
            FROM notification_batches b
            JOIN users u ON b.user_id = u.id
            JOIN feeds f ON b.feed_id = f.id
            WHERE b.status = $1 AND b.scheduled_for <= $2
            ORDER BY b.scheduled_for ASC, b.id ASC
            "#,
        )
        .bind(BatchStatus::Pending.to_string())
        .bind(now)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Ok(vec![]);
        }

        // One batched lookup for every returned batch's posts.
        let batch_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let post_rows: Vec<(Uuid, Uuid, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT bp.batch_id, p.id, p.title, p.short_title, p.image_url
            FROM notification_batch_posts bp
            JOIN posts p ON bp.post_id = p.id
            WHERE bp.batch_id = ANY($1)
            ORDER BY bp.batch_id, bp.position ASC
            "#,
        )
        .bind(&batch_ids)
        .fetch_all(pool)
        .await?;

        let mut posts_by_batch: HashMap<Uuid, Vec<PostSummary>> = HashMap::new();
        for (batch_id, id, title, short_title, image_url) in post_rows {
            posts_by_batch.entry(batch_id).or_default().push(PostSummary {
                id,
                title,
                short_title,
                image_url,
            });
        }

        let due = rows
            .into_iter()
            .map(|row| {
                let posts = posts_by_batch.remove(&row.id).unwrap_or_default();
                DueBatch {
                    batch: NotificationBatch {
                        id: row.id,
                        user_id: row.user_id,
                        feed_id: row.feed_id,
                        post_count: row.post_count,
                        batch_type: row.batch_type,
                        scheduled_for: row.scheduled_for,
                        status: row.status,
                        sent_at: row.sent_at,
                        error_message: row.error_message,
                        created_at: row.created_at,
                    },
                    email: row.email,
                    username: row.username,
                    feed_name: row.feed_name,
                    posts,
                }
            })
            .collect();

        Ok(due)
    }

    /// Transition a batch `pending -> sent`, stamping `sent_at`.
    ///
    /// The UPDATE only matches a pending row. Losing the race (or calling on
    /// an already-terminal batch) yields `InvalidTransition` and leaves the
    /// recorded outcome untouched.
    pub async fn mark_sent(pool: &PgPool, batch_id: Uuid) -> Result<NotificationBatch, AppError> {
        let updated: Option<NotificationBatch> = sqlx::query_as(
            r#"
            UPDATE notification_batches
            SET status = $1, sent_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(BatchStatus::Sent.to_string())
        .bind(batch_id)
        .bind(BatchStatus::Pending.to_string())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(batch) => {
                tracing::info!(batch_id = %batch_id, "Batch marked sent");
                Ok(batch)
            }
            None => Err(Self::transition_rejection(pool, batch_id).await?),
        }
    }

    /// Transition a batch `pending -> failed`, recording the error message for
    /// operator inspection.
    pub async fn mark_failed(
        pool: &PgPool,
        batch_id: Uuid,
        error_message: &str,
    ) -> Result<NotificationBatch, AppError> {
        let updated: Option<NotificationBatch> = sqlx::query_as(
            r#"
            UPDATE notification_batches
            SET status = $1, error_message = $2
            WHERE id = $3 AND status = $4
            RETURNING *
            "#,
        )
        .bind(BatchStatus::Failed.to_string())
        .bind(error_message)
        .bind(batch_id)
        .bind(BatchStatus::Pending.to_string())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(batch) => {
                tracing::warn!(batch_id = %batch_id, error = error_message, "Batch marked failed");
                Ok(batch)
            }
            None => Err(Self::transition_rejection(pool, batch_id).await?),
        }
    }

    /// Recent batches for the operator view, newest first, optionally filtered
    /// by status.
    pub async fn list_recent(
        pool: &PgPool,
        status: Option<BatchStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationBatch>, AppError> {
        let batches: Vec<NotificationBatch> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM notification_batches
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(status.to_string())
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM notification_batches ORDER BY created_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(batches)
    }

    /// Explain a failed conditional transition: the batch either does not
    /// exist or already reached a terminal state.
    async fn transition_rejection(pool: &PgPool, batch_id: Uuid) -> Result<AppError, AppError> {
        let current: Option<(BatchStatus,)> =
            sqlx::query_as("SELECT status FROM notification_batches WHERE id = $1")
                .bind(batch_id)
                .fetch_optional(pool)
                .await?;

        Ok(match current {
            Some((status,)) => AppError::InvalidTransition(format!(
                "Batch {} is {}, expected pending",
                batch_id, status
            )),
            None => AppError::NotFound(format!("Batch {} not found", batch_id)),
        })
    }
}

/// Deduplicate post ids preserving first-occurrence order.
fn dedup_post_ids(post_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    post_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_inclusion_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let deduped = dedup_post_ids(&[a, b, a, c, b]);
        assert_eq!(deduped, vec![a, b, c]);
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup_post_ids(&[]).is_empty());
    }

    #[test]
    fn test_dedup_no_duplicates_is_identity() {
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        assert_eq!(dedup_post_ids(&ids), ids);
    }
}
