//! Push subscription service — persistence for browser push subscriptions.
//!
//! A signed-in user has at most one subscription row; subscribing again from a
//! new browser or device replaces the stored endpoint and keys in place.
//! Anonymous subscriptions carry no user id and are stored as-is.

use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::PushSubscription;

/// Service layer for push subscription storage.
pub struct SubscriptionService;

/// Client key pair issued by the browser alongside the endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Parameters for creating or replacing a subscription.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpsertSubscriptionParams {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

impl SubscriptionService {
    /// Create or replace the push subscription for a caller.
    ///
    /// With a user id this is an atomic insert-or-replace keyed on the user:
    /// a second call overwrites the stored endpoint and keys. Without one the
    /// subscription is anonymous and a fresh row is inserted every time.
    pub async fn upsert(
        pool: &PgPool,
        user_id: Option<Uuid>,
        params: &UpsertSubscriptionParams,
    ) -> Result<PushSubscription, AppError> {
        if params.endpoint.trim().is_empty() {
            return Err(AppError::Validation(
                "Subscription endpoint must not be empty".to_string(),
            ));
        }
        if params.keys.p256dh.trim().is_empty() || params.keys.auth.trim().is_empty() {
            return Err(AppError::Validation(
                "Subscription keys p256dh and auth must not be empty".to_string(),
            ));
        }

        let sub: PushSubscription = match user_id {
            Some(user_id) => {
                sqlx::query_as(
                    r#"
                    INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (user_id) WHERE user_id IS NOT NULL
                    DO UPDATE SET endpoint = $3, p256dh = $4, auth = $5, updated_at = NOW()
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(&params.endpoint)
                .bind(&params.keys.p256dh)
                .bind(&params.keys.auth)
                .fetch_one(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth)
                    VALUES ($1, NULL, $2, $3, $4)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&params.endpoint)
                .bind(&params.keys.p256dh)
                .bind(&params.keys.auth)
                .fetch_one(pool)
                .await?
            }
        };

        tracing::info!(
            subscription_id = %sub.id,
            user_id = ?user_id,
            "Push subscription saved"
        );

        Ok(sub)
    }

    /// List the subscriptions for a user.
    ///
    /// Zero or one row today; the list shape leaves room for multi-device
    /// subscriptions without changing callers.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<PushSubscription>, AppError> {
        let subs: Vec<PushSubscription> = sqlx::query_as(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }

    /// Delete the caller's subscription for an endpoint. Returns true if a row
    /// was removed.
    ///
    /// Scoped to the caller's identity: an anonymous caller only removes
    /// anonymous rows, a signed-in caller only their own.
    pub async fn delete_by_endpoint(
        pool: &PgPool,
        user_id: Option<Uuid>,
        endpoint: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM push_subscriptions WHERE endpoint = $1 AND user_id IS NOT DISTINCT FROM $2",
        )
        .bind(endpoint)
        .bind(user_id)
        .execute(pool)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(user_id = ?user_id, "Push subscription removed");
        }

        Ok(deleted)
    }
}
