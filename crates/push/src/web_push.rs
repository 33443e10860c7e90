//! Web Push delivery over HTTP.
//!
//! Sends the payload as JSON to the subscription's endpoint with a VAPID
//! `Authorization` header: an ES256 JWT over the endpoint's origin, signed
//! with the server's VAPID private key. Payload content encryption is the
//! push service boundary's concern, not this client's.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;

use courier_common::types::{PushPayload, PushSubscription};

use crate::client::{DeliveryClient, DeliveryError};

/// Lifetime of a VAPID token. Push services cap this at 24 hours.
const VAPID_TOKEN_LIFETIME_HOURS: i64 = 12;

/// How long the push service may hold an undeliverable message.
const DEFAULT_TTL_SECS: u64 = 4 * 60 * 60;

/// VAPID claims signed into the `Authorization` header.
#[derive(Debug, Serialize)]
struct VapidClaims {
    /// Origin of the push service endpoint
    aud: String,
    /// Expiration time (UNIX timestamp)
    exp: i64,
    /// Contact URI for the application server
    sub: String,
}

/// Web Push client backed by reqwest.
pub struct WebPushClient {
    http: reqwest::Client,
    vapid_private_key_pem: String,
    vapid_public_key: String,
    subject: String,
    ttl_secs: u64,
}

impl WebPushClient {
    pub fn new(vapid_private_key_pem: String, vapid_public_key: String, subject: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            vapid_private_key_pem,
            vapid_public_key,
            subject,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    /// Override the push service message TTL.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Build the `Authorization` header value for an endpoint.
    fn vapid_authorization(&self, endpoint: &str) -> Result<String, DeliveryError> {
        let aud = endpoint_origin(endpoint)?;
        let claims = VapidClaims {
            aud,
            exp: (Utc::now() + Duration::hours(VAPID_TOKEN_LIFETIME_HOURS)).timestamp(),
            sub: self.subject.clone(),
        };

        let key = EncodingKey::from_ec_pem(self.vapid_private_key_pem.as_bytes())
            .map_err(|e| DeliveryError::Vapid(format!("Invalid VAPID private key: {}", e)))?;
        let token = encode(&Header::new(Algorithm::ES256), &claims, &key)
            .map_err(|e| DeliveryError::Vapid(e.to_string()))?;

        Ok(format!("vapid t={}, k={}", token, self.vapid_public_key))
    }
}

impl DeliveryClient for WebPushClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        let authorization = self.vapid_authorization(&subscription.endpoint)?;

        let response = self
            .http
            .post(&subscription.endpoint)
            .header("Authorization", authorization)
            .header("TTL", self.ttl_secs)
            .json(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, body)
    }
}

/// Extract the origin a VAPID token must be scoped to.
fn endpoint_origin(endpoint: &str) -> Result<String, DeliveryError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| DeliveryError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    let origin = url.origin();
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DeliveryError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    Ok(origin.ascii_serialization())
}

/// Map a push service response status to a delivery outcome.
///
/// 404/410 mean the subscription is gone on the push service side (expired or
/// unsubscribed); everything else non-2xx is a rejection.
fn classify_status(status: u16, body: String) -> Result<(), DeliveryError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(DeliveryError::SubscriptionGone(status)),
        _ => {
            let mut body = body;
            body.truncate(200);
            Err(DeliveryError::Rejected { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_origin_strips_path() {
        let origin =
            endpoint_origin("https://fcm.googleapis.com/fcm/send/abc123:def456").unwrap();
        assert_eq!(origin, "https://fcm.googleapis.com");
    }

    #[test]
    fn test_endpoint_origin_keeps_explicit_port() {
        let origin = endpoint_origin("https://push.example.com:8443/ep/1").unwrap();
        assert_eq!(origin, "https://push.example.com:8443");
    }

    #[test]
    fn test_endpoint_origin_rejects_garbage() {
        assert!(matches!(
            endpoint_origin("not a url"),
            Err(DeliveryError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_endpoint_origin_rejects_non_http_scheme() {
        assert!(matches!(
            endpoint_origin("ftp://push.example.com/ep"),
            Err(DeliveryError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_classify_success() {
        assert!(classify_status(201, String::new()).is_ok());
    }

    #[test]
    fn test_classify_gone() {
        assert!(matches!(
            classify_status(410, String::new()),
            Err(DeliveryError::SubscriptionGone(410))
        ));
    }

    #[test]
    fn test_classify_rejected_truncates_body() {
        let long_body = "x".repeat(500);
        match classify_status(429, long_body) {
            Err(DeliveryError::Rejected { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body.len(), 200);
            }
            other => panic!("Expected Rejected, got {:?}", other.err()),
        }
    }
}
