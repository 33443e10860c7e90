//! Batch delivery dispatcher.
//!
//! One `run_tick` call per polling tick:
//! 1. Scan for due batches (pending, scheduled at or before now)
//! 2. For each batch, independently: resolve the user's subscriptions, build
//!    the payload, deliver, and apply exactly one terminal transition
//!    (`pending -> sent` or `pending -> failed`)
//!
//! A batch that fails delivery never blocks the rest of the tick, and a batch
//! whose transition is lost to a racing invocation is skipped. Store failures
//! outside a single batch's transition abort the tick so the outer loop can
//! retry it wholesale; everything not yet transitioned stays pending.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::DueBatch;
use courier_push::DeliveryClient;
use courier_store::batch::BatchService;
use courier_store::subscription::SubscriptionService;

use crate::payload::build_payload;

/// Outcome counters for one tick, logged and returned to the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Batches the due scan returned
    pub due: usize,
    /// Batches delivered and marked sent
    pub sent: usize,
    /// Batches marked failed (no subscription, delivery error, or timeout)
    pub failed: usize,
    /// Batches skipped because another invocation finalized them first
    pub skipped: usize,
}

/// Terminal outcome of one batch's delivery attempt.
enum BatchOutcome {
    Sent,
    Failed,
}

/// Dispatcher that drains due batches through a delivery client.
pub struct BatchDispatcher<C: DeliveryClient> {
    pool: PgPool,
    client: C,
    delivery_timeout: Duration,
}

impl<C: DeliveryClient> BatchDispatcher<C> {
    pub fn new(pool: PgPool, client: C, delivery_timeout: Duration) -> Self {
        Self {
            pool,
            client,
            delivery_timeout,
        }
    }

    /// Process every batch due at `now`. One invocation per polling tick;
    /// invocations must not overlap (the binary guards this with the tick
    /// lock).
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickSummary, AppError> {
        let due = BatchService::find_due(&self.pool, now).await?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };

        for batch in &due {
            match self.deliver_batch(batch).await {
                Ok(BatchOutcome::Sent) => summary.sent += 1,
                Ok(BatchOutcome::Failed) => summary.failed += 1,
                Err(AppError::InvalidTransition(msg)) => {
                    // Another invocation finalized this batch between our scan
                    // and our transition. Its outcome stands.
                    tracing::warn!(batch_id = %batch.batch.id, %msg, "Batch already finalized");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if summary.due > 0 {
            tracing::info!(
                due = summary.due,
                sent = summary.sent,
                failed = summary.failed,
                skipped = summary.skipped,
                "Tick complete"
            );
        }

        Ok(summary)
    }

    /// Attempt delivery of a single batch and record its terminal state.
    async fn deliver_batch(&self, due: &DueBatch) -> Result<BatchOutcome, AppError> {
        let batch_id = due.batch.id;
        let subscriptions =
            SubscriptionService::find_for_user(&self.pool, due.batch.user_id).await?;

        if subscriptions.is_empty() {
            let message = format!("no subscription for user {}", due.batch.user_id);
            BatchService::mark_failed(&self.pool, batch_id, &message).await?;
            return Ok(BatchOutcome::Failed);
        }

        let payload = build_payload(due);

        // All subscriptions must accept the payload for the batch to count as
        // sent; the last failure message is the one recorded.
        let mut delivery_error: Option<String> = None;
        for subscription in &subscriptions {
            match tokio::time::timeout(
                self.delivery_timeout,
                self.client.send(subscription, &payload),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        subscription_id = %subscription.id,
                        error = %e,
                        "Push delivery failed"
                    );
                    delivery_error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        subscription_id = %subscription.id,
                        timeout_secs = self.delivery_timeout.as_secs(),
                        "Push delivery timed out"
                    );
                    delivery_error = Some(format!(
                        "delivery timed out after {}s",
                        self.delivery_timeout.as_secs()
                    ));
                }
            }
        }

        match delivery_error {
            None => {
                BatchService::mark_sent(&self.pool, batch_id).await?;
                Ok(BatchOutcome::Sent)
            }
            Some(message) => {
                BatchService::mark_failed(&self.pool, batch_id, &message).await?;
                Ok(BatchOutcome::Failed)
            }
        }
    }
}
