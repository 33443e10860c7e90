//! Push delivery: the `DeliveryClient` seam consumed by the scheduler, and
//! the Web Push implementation that talks to browser push services.

pub mod client;
pub mod web_push;

pub use client::{DeliveryClient, DeliveryError};
pub use web_push::WebPushClient;
