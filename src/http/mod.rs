//! HTTP surface: the dispatch trigger, push endpoint registration, and the
//! subscription submission endpoints.
//!
//! Authentication is an external collaborator: an outer layer authenticates
//! the request and installs a [`SessionPrincipal`] extension; handlers only
//! consume it.

mod dispatch;
mod endpoints;
mod session;
mod subscriptions;

pub use session::SessionPrincipal;

use crate::config::Config;
use crate::push::PushClient;
use crate::storage::{PushEndpointStore, Subscription, SubscriptionStore};
use axum::Router;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct AppContext<S, P> {
    pub store: S,
    pub push: P,
    pub config: Arc<Config>,
}

impl<S, P> AppContext<S, P> {
    pub fn new(store: S, push: P, config: Arc<Config>) -> Self {
        Self {
            store,
            push,
            config,
        }
    }
}

impl<S: Clone, P: Clone> Clone for AppContext<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            push: self.push.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Response envelope of the submission endpoints, also decoded by the offline
/// sync client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubmitEnvelope {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<SubmitData>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitData {
    pub subscriptions: Vec<Subscription>,
}

/// Minimal acknowledgement body for endpoint registration calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    #[must_use]
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Build the API router over the given context.
pub fn router<S, P>(ctx: AppContext<S, P>) -> Router
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/api/notifications/dispatch",
            post(dispatch::trigger::<S, P>),
        )
        .route(
            "/api/push-endpoints",
            post(endpoints::register::<S, P>).delete(endpoints::unregister::<S, P>),
        )
        .route(
            "/api/subscriptions",
            get(subscriptions::list::<S, P>).post(subscriptions::submit::<S, P>),
        )
        .route(
            "/api/subscriptions/{id}",
            post(subscriptions::update::<S, P>).delete(subscriptions::remove::<S, P>),
        )
        .with_state(ctx)
}
