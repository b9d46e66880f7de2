//! Subtrack - subscription tracking with proactive billing reminders
//!
//! Subtrack keeps a user's recurring subscriptions (service, billing cycle,
//! amount, first payment date) and reminds the owner over web push before
//! each charge recurs, even for entries created while the user was offline.
//!
//! # Features
//!
//! - **Billing calculator**: deterministic, idempotent next-billing-date
//!   computation with calendar-accurate month stepping
//! - **Notification dispatch**: at most one reminder per subscription per
//!   calendar day, with dead push endpoints pruned in passing
//! - **Web push**: VAPID-signed delivery over the standard protocol
//! - **Offline cache**: optimistic local adds with provisional identity and
//!   FIFO replay against the server once connectivity returns
//! - **Storage ports**: bring your own database behind small async traits;
//!   in-memory implementations included
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subtrack::{AppContext, ConfigBuilder, InMemoryStore, router};
//! use subtrack::push::WebPushDelivery;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     subtrack::init_tracing();
//!
//!     let config = Arc::new(ConfigBuilder::new().from_env().build());
//!     let store = InMemoryStore::new();
//!     let push = WebPushDelivery::new(config.push.clone());
//!
//!     let app = router(AppContext::new(store, push, config));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod billing;
mod config;
mod error;
pub mod http;
pub mod offline;
pub mod push;
pub mod storage;

// Re-exports for public API
pub use billing::{
    BillingComputation, CycleUnit, DispatchOutcome, NotificationDispatcher,
    compute_next_billing, compute_next_billing_on,
};
pub use config::{Config, ConfigBuilder, LoggingConfig, PushConfig};
pub use error::{Result, SubtrackError};
pub use http::{AppContext, SessionPrincipal, SubmitData, SubmitEnvelope, router};
pub use offline::{
    LocalRecord, OfflineCache, OfflineStore, RecordId, SqliteOfflineStore, SubscriptionDraft,
    SyncOutcome,
};
pub use push::{DeliveryOutcome, NotificationPayload, PushClient, WebPushDelivery};
pub use storage::{
    InMemoryStore, PushEndpoint, PushEndpointStore, Subscription, SubscriptionStore,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "subtrack=debug")
/// - `SUBTRACK_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("SUBTRACK_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
