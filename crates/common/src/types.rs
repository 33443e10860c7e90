use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a notification batch was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    Hourly,
    Daily,
    Immediate,
}

impl std::fmt::Display for BatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchType::Hourly => write!(f, "hourly"),
            BatchType::Daily => write!(f, "daily"),
            BatchType::Immediate => write!(f, "immediate"),
        }
    }
}

/// Delivery status of a notification batch.
///
/// `Pending` is the only state a batch can transition out of; `Sent` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Sent => write!(f, "sent"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A user in the system.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An RSS feed tracked by the ingestion process.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A browser push subscription: endpoint plus the client key pair.
///
/// `user_id` is `None` for anonymous subscriptions, which are never
/// deduplicated. A signed-in user has at most one row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group of posts scheduled for a single push delivery to one user for one
/// feed.
///
/// Post membership lives in `notification_batch_posts`; `post_count` is
/// derived from it at creation time. `sent_at` is set only on the transition
/// to `Sent`, `error_message` only on the transition to `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationBatch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub post_count: i32,
    pub batch_type: BatchType,
    pub scheduled_for: DateTime<Utc>,
    pub status: BatchStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Minimal display fields of a post, as hydrated into a due batch.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub short_title: Option<String>,
    pub image_url: Option<String>,
}

/// A pending batch whose scheduled time has passed, hydrated with everything
/// the dispatcher needs to build and address a delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DueBatch {
    pub batch: NotificationBatch,
    pub email: String,
    pub username: String,
    pub feed_name: String,
    /// Post summaries in batch inclusion order.
    pub posts: Vec<PostSummary>,
}

/// The JSON document handed to the push service for one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Notification title shown by the browser.
    pub title: String,
    /// Body text composed from the batch's post titles.
    pub body: String,
    pub batch_type: BatchType,
    pub post_count: u32,
    /// Image of the first post that carries one, if any.
    pub image_url: Option<String>,
}
