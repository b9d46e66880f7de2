//! Storage ports for server-side subscription data.
//!
//! The relational engine behind these traits is an external collaborator;
//! implement them against your database. [`InMemoryStore`] is a complete
//! reference implementation used by the test suite.

mod in_memory;

pub use in_memory::InMemoryStore;

use crate::billing::{BillingComputation, CycleUnit};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked subscription as the server knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Server-assigned identifier, stable for the record's lifetime.
    pub id: i64,
    /// Owning user. Ownerless rows are skipped by the dispatcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub service_name: String,
    pub cycle: CycleUnit,
    pub amount: i64,
    /// First payment date as entered by the user (calendar date string).
    pub first_payment_date: String,
    /// Cached next billing date; self-corrected on every dispatch pass.
    pub next_billing_at: String,
    pub days_until_next_billing: i64,
    /// How many days ahead of the billing date the reminder fires.
    pub notify_days_before: i64,
    /// Same-day notification watermark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub user_id: String,
    pub service_name: String,
    pub cycle: CycleUnit,
    pub amount: i64,
    pub first_payment_date: String,
    pub next_billing_at: String,
    pub days_until_next_billing: i64,
    pub notify_days_before: i64,
    pub tags: Vec<String>,
}

/// Field changes applied by a subscription update.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChanges {
    pub service_name: String,
    pub cycle: CycleUnit,
    pub amount: i64,
    pub first_payment_date: String,
    pub next_billing_at: String,
    pub days_until_next_billing: i64,
    pub notify_days_before: i64,
    pub tags: Vec<String>,
}

/// A registered web-push delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEndpoint {
    pub id: i64,
    pub user_id: String,
    /// Delivery URL, unique per user.
    pub endpoint: String,
    /// Client public key for payload encryption.
    pub p256dh: String,
    /// Client authentication secret.
    pub auth: String,
    /// Expiration reported by the client, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    /// Client descriptor captured at registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Input for registering (or re-registering) a push endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRegistration {
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub expiration_time: Option<i64>,
    pub user_agent: Option<String>,
}

/// Trait for storing subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions, every owner. Used by the dispatcher.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// One user's subscriptions, newest created first.
    async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>>;

    /// Insert a subscription and return it with its assigned identity.
    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription>;

    /// Apply field changes to the user's subscription. A missing row is not
    /// an error; the caller reads back the list either way.
    async fn update_subscription(
        &self,
        id: i64,
        user_id: &str,
        changes: SubscriptionChanges,
    ) -> Result<()>;

    /// Delete the user's subscription.
    async fn delete_subscription(&self, id: i64, user_id: &str) -> Result<()>;

    /// Persist freshly computed billing fields.
    async fn update_billing(&self, id: i64, computed: &BillingComputation) -> Result<()>;

    /// Stamp the same-day notification watermark.
    async fn mark_notified(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Trait for storing push endpoints.
#[async_trait]
pub trait PushEndpointStore: Send + Sync {
    /// All endpoints belonging to any of the given users, in one lookup.
    async fn endpoints_for_users(&self, user_ids: &[String]) -> Result<Vec<PushEndpoint>>;

    /// Insert or refresh an endpoint, keyed by owner + endpoint URL.
    async fn upsert_endpoint(&self, registration: EndpointRegistration) -> Result<()>;

    /// Remove an endpoint by id (self-healing after a gone delivery).
    async fn delete_endpoint(&self, id: i64) -> Result<()>;

    /// Remove an endpoint by owner + endpoint URL (explicit unsubscribe).
    async fn delete_endpoint_for_user(&self, user_id: &str, endpoint: &str) -> Result<()>;

    /// Whether the user has at least one registered endpoint.
    async fn has_endpoint(&self, user_id: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_wire_casing() {
        let sub = Subscription {
            id: 7,
            user_id: Some("user-1".to_string()),
            service_name: "Filmbox".to_string(),
            cycle: CycleUnit::Monthly,
            amount: 1490,
            first_payment_date: "2024-01-15".to_string(),
            next_billing_at: "2024-04-15T00:00:00.000Z".to_string(),
            days_until_next_billing: 26,
            notify_days_before: 1,
            last_notified_at: None,
            tags: vec!["video".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["serviceName"], "Filmbox");
        assert_eq!(json["cycle"], "monthly");
        assert_eq!(json["daysUntilNextBilling"], 26);
        assert!(json.get("lastNotifiedAt").is_none());

        let back: Subscription = serde_json::from_value(json).unwrap();
        assert_eq!(back, sub);
    }
}
