//! Web-push delivery port.
//!
//! [`PushClient`] abstracts signing and sending one message to one endpoint.
//! [`WebPushDelivery`] is the production implementation; a mock lives in
//! [`test`] for exercising the dispatcher without a push service.

mod delivery;

pub use delivery::WebPushDelivery;

use crate::error::Result;
use crate::storage::PushEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default notification title when a payload arrives without one.
pub const DEFAULT_TITLE: &str = "Subscription reminder";
/// Default notification icon path.
pub const DEFAULT_ICON: &str = "/favicon.png";
/// Default click-through target.
pub const DEFAULT_URL: &str = "/subscriptions";

/// Wire payload of one push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Per-day dedup tag; the platform collapses notifications sharing a tag.
    pub tag: String,
    pub data: PayloadData,
}

/// Click-through data carried alongside the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<i64>,
}

impl Default for PayloadData {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            subscription_id: None,
        }
    }
}

impl NotificationPayload {
    /// Decode a received push payload, failing closed.
    ///
    /// Push events can carry anything; a malformed or partial payload must
    /// still produce a displayable notification. Each field degrades
    /// independently to its default instead of the whole decode erroring.
    #[must_use]
    pub fn from_json_value(value: Value) -> Self {
        let field = |name: &str| -> Option<String> {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(ToString::to_string)
        };

        let data = value
            .get("data")
            .cloned()
            .and_then(|d| serde_json::from_value::<PayloadData>(d).ok())
            .unwrap_or_default();

        Self {
            title: field("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: field("body").unwrap_or_default(),
            icon: field("icon").unwrap_or_else(|| DEFAULT_ICON.to_string()),
            tag: field("tag").unwrap_or_default(),
            data,
        }
    }
}

/// What a single delivery attempt reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The push service accepted the message.
    Delivered,
    /// The endpoint no longer exists (404/410-class); delete it.
    Gone,
    /// Any other non-success response.
    Rejected,
}

/// Port for signing and sending one message to one endpoint.
///
/// Transport failures surface as `Err`; the dispatcher absorbs them into its
/// failure counter without aborting sibling deliveries.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(
        &self,
        endpoint: &PushEndpoint,
        payload: &NotificationPayload,
    ) -> Result<DeliveryOutcome>;
}

/// Mock push client for testing.
#[cfg(any(test, feature = "test-util"))]
pub mod test {
    use super::*;
    use crate::error::SubtrackError;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Records every send and replays scripted outcomes per endpoint URL.
    /// Unscripted endpoints report [`DeliveryOutcome::Delivered`].
    #[derive(Default, Clone)]
    pub struct MockPushClient {
        inner: Arc<Mutex<MockPushInner>>,
    }

    #[derive(Default)]
    struct MockPushInner {
        outcomes: HashMap<String, DeliveryOutcome>,
        errors: HashMap<String, String>,
        sent: Vec<(String, NotificationPayload)>,
    }

    impl MockPushClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the outcome returned for an endpoint URL.
        pub fn set_outcome(&self, endpoint_url: &str, outcome: DeliveryOutcome) {
            self.inner
                .lock()
                .unwrap()
                .outcomes
                .insert(endpoint_url.to_string(), outcome);
        }

        /// Script a transport error for an endpoint URL.
        pub fn set_error(&self, endpoint_url: &str, message: &str) {
            self.inner
                .lock()
                .unwrap()
                .errors
                .insert(endpoint_url.to_string(), message.to_string());
        }

        /// Every (endpoint URL, payload) pair sent so far.
        pub fn sent(&self) -> Vec<(String, NotificationPayload)> {
            self.inner.lock().unwrap().sent.clone()
        }

        pub fn sent_count(&self) -> usize {
            self.inner.lock().unwrap().sent.len()
        }
    }

    #[async_trait]
    impl PushClient for MockPushClient {
        async fn send(
            &self,
            endpoint: &PushEndpoint,
            payload: &NotificationPayload,
        ) -> Result<DeliveryOutcome> {
            let mut inner = self.inner.lock().unwrap();
            inner
                .sent
                .push((endpoint.endpoint.clone(), payload.clone()));
            if let Some(message) = inner.errors.get(&endpoint.endpoint) {
                return Err(SubtrackError::internal(message.clone()));
            }
            Ok(inner
                .outcomes
                .get(&endpoint.endpoint)
                .copied()
                .unwrap_or(DeliveryOutcome::Delivered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_round_trip() {
        let payload = NotificationPayload {
            title: "Subscription payment reminder".to_string(),
            body: "Filmbox: payment is due today.".to_string(),
            icon: DEFAULT_ICON.to_string(),
            tag: "subscription-7-2024-04-15".to_string(),
            data: PayloadData {
                url: DEFAULT_URL.to_string(),
                subscription_id: Some(7),
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["data"]["subscriptionId"], 7);

        let decoded = NotificationPayload::from_json_value(value);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_fails_closed_on_garbage() {
        let decoded = NotificationPayload::from_json_value(json!("not an object"));
        assert_eq!(decoded.title, DEFAULT_TITLE);
        assert_eq!(decoded.body, "");
        assert_eq!(decoded.icon, DEFAULT_ICON);
        assert_eq!(decoded.data.url, DEFAULT_URL);
        assert_eq!(decoded.data.subscription_id, None);
    }

    #[test]
    fn test_decode_degrades_field_by_field() {
        let decoded = NotificationPayload::from_json_value(json!({
            "title": "Custom",
            "body": 42,
            "data": {"url": "/calendar"}
        }));
        assert_eq!(decoded.title, "Custom");
        assert_eq!(decoded.body, "");
        assert_eq!(decoded.data.url, "/calendar");
    }

    #[test]
    fn test_decode_malformed_data_defaults() {
        let decoded = NotificationPayload::from_json_value(json!({
            "title": "Custom",
            "data": "nope"
        }));
        assert_eq!(decoded.data.url, DEFAULT_URL);
    }
}
