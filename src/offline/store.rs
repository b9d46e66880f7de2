//! Local durable storage for the offline cache.
//!
//! Two collections back the cache: a materialized view of subscription
//! records (server-confirmed and locally pending together) and an
//! append-only FIFO queue of mutations awaiting replay. The trait is the
//! seam; [`super::SqliteOfflineStore`] persists to disk and
//! [`super::InMemoryOfflineStore`] backs tests.

use crate::billing::CycleUnit;
use crate::error::Result;
use crate::storage::Subscription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a locally cached record.
///
/// Confirmed records carry the server-assigned id; pending records carry the
/// locally generated correlation id. The two spaces are disjoint by
/// construction, so merging a server list over the local view can never
/// collide with a pending entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Confirmed(i64),
    Pending(String),
}

impl RecordId {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Stable storage key. The prefix keeps the two id spaces apart inside
    /// backends that key rows by a single string column.
    pub(crate) fn storage_key(&self) -> String {
        match self {
            Self::Confirmed(id) => format!("srv:{id}"),
            Self::Pending(client_id) => format!("loc:{client_id}"),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed(id) => write!(f, "{id}"),
            Self::Pending(client_id) => write!(f, "{client_id}"),
        }
    }
}

/// A subscription as the client cache sees it: the server fields plus local
/// bookkeeping for not-yet-synced entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub service_name: String,
    pub cycle: CycleUnit,
    pub amount: i64,
    pub first_payment_date: String,
    pub next_billing_at: String,
    pub days_until_next_billing: i64,
    pub notify_days_before: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
    /// True until the server confirms this record.
    #[serde(default)]
    pub pending: bool,
    /// Correlation id, present only while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl LocalRecord {
    /// Convert a server-confirmed subscription into its cached form.
    #[must_use]
    pub fn from_server(subscription: Subscription) -> Self {
        Self {
            id: RecordId::Confirmed(subscription.id),
            user_id: subscription.user_id,
            service_name: subscription.service_name,
            cycle: subscription.cycle,
            amount: subscription.amount,
            first_payment_date: subscription.first_payment_date,
            next_billing_at: subscription.next_billing_at,
            days_until_next_billing: subscription.days_until_next_billing,
            notify_days_before: subscription.notify_days_before,
            tags: subscription.tags,
            created_at: Some(subscription.created_at),
            updated_at: Some(subscription.updated_at),
            last_notified_at: subscription.last_notified_at,
            pending: false,
            client_id: None,
        }
    }
}

/// User input for a subscription that has not reached the server yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDraft {
    pub service_name: String,
    pub cycle: CycleUnit,
    pub amount: i64,
    pub first_payment_date: String,
    #[serde(default = "default_notify_days")]
    pub notify_days_before: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_notify_days() -> i64 {
    1
}

/// Kind of queued mutation. Only additions are queued today; the enum keeps
/// the queue format open for edits and deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Add,
}

/// A queued mutation awaiting replay, before the store assigns its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPendingMutation {
    pub kind: MutationKind,
    pub client_id: String,
    pub draft: SubscriptionDraft,
    pub enqueued_at: DateTime<Utc>,
}

impl NewPendingMutation {
    #[must_use]
    pub fn add(client_id: String, draft: SubscriptionDraft) -> Self {
        Self {
            kind: MutationKind::Add,
            client_id,
            draft,
            enqueued_at: Utc::now(),
        }
    }
}

/// A queued mutation with its queue position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Insertion-ordered key; replay order is ascending key order.
    pub key: u64,
    pub kind: MutationKind,
    pub client_id: String,
    pub draft: SubscriptionDraft,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingMutation {
    pub(crate) fn from_parts(key: u64, new: NewPendingMutation) -> Self {
        Self {
            key,
            kind: new.kind,
            client_id: new.client_id,
            draft: new.draft,
            enqueued_at: new.enqueued_at,
        }
    }
}

/// Trait for the client-side durable store.
///
/// Individual operations are atomic; multi-step sequences (add, sync,
/// reconcile) are not, so callers keep one logical operation in flight at a
/// time.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// All cached records, in no particular order.
    async fn list_records(&self) -> Result<Vec<LocalRecord>>;

    /// Insert or replace a record, keyed by its id.
    async fn put_record(&self, record: &LocalRecord) -> Result<()>;

    /// Remove a record by id. Removing an absent id is not an error.
    async fn delete_record(&self, id: &RecordId) -> Result<()>;

    /// Remove every record.
    async fn clear_records(&self) -> Result<()>;

    /// Queued mutations in FIFO order.
    async fn list_pending(&self) -> Result<Vec<PendingMutation>>;

    /// Append a mutation and return its assigned key.
    async fn enqueue_pending(&self, mutation: NewPendingMutation) -> Result<u64>;

    /// Remove a queue entry by key.
    async fn delete_pending(&self, key: u64) -> Result<()>;
}
