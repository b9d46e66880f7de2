//! Offline-first client cache.
//!
//! Lets a disconnected user keep adding subscriptions: entries get
//! provisional identity and a queue slot immediately, then reconcile with the
//! server's canonical records once connectivity returns.

mod cache;
mod http_client;
mod in_memory;
mod sqlite;
mod store;

pub use cache::{OfflineCache, SubmitClient, SyncOutcome};
pub use http_client::HttpSubmitClient;
pub use in_memory::InMemoryOfflineStore;
pub use sqlite::SqliteOfflineStore;
pub use store::{
    LocalRecord, MutationKind, NewPendingMutation, OfflineStore, PendingMutation, RecordId,
    SubscriptionDraft,
};

#[cfg(any(test, feature = "test-util"))]
pub use cache::test::MockSubmitClient;
