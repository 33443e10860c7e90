//! The delivery seam between the scheduler and the push transport.

use std::future::Future;

use thiserror::Error;

use courier_common::types::{PushPayload, PushSubscription};

/// Errors surfaced by a delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("push service rejected delivery: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("subscription is no longer valid (HTTP {0})")]
    SubscriptionGone(u16),

    #[error("invalid subscription endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("VAPID signing failed: {0}")]
    Vapid(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A client that can deliver one payload to one push subscription.
///
/// The scheduler decides *what* to send and *when*; implementations own the
/// wire transport. Test doubles implement this directly.
pub trait DeliveryClient: Send + Sync {
    fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
