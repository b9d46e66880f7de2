//! Notification dispatch trigger endpoint.
//!
//! Invoked by an external periodic scheduler. Guarded by a bearer secret
//! rather than a user session; configuration gaps are surfaced as server
//! errors before any work starts.

use crate::billing::NotificationDispatcher;
use crate::error::{Result, SubtrackError};
use crate::http::AppContext;
use crate::push::PushClient;
use crate::storage::{PushEndpointStore, SubscriptionStore};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

pub async fn trigger<S, P>(
    State(ctx): State<AppContext<S, P>>,
    headers: HeaderMap,
) -> Result<Json<crate::billing::DispatchOutcome>>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let push_config = &ctx.config.push;

    let Some(secret) = push_config.cron_secret.as_ref() else {
        return Err(SubtrackError::internal("PUSH_CRON_SECRET is not configured"));
    };
    if !push_config.signing_configured() {
        return Err(SubtrackError::internal("VAPID keys are not configured"));
    }

    let token = bearer_token(&headers)
        .ok_or_else(|| SubtrackError::unauthorized("unauthorized request"))?;
    if !constant_time_eq(token.as_bytes(), secret.expose_secret().as_bytes()) {
        return Err(SubtrackError::unauthorized("unauthorized request"));
    }

    let dispatcher = NotificationDispatcher::new(ctx.store.clone(), ctx.push.clone());
    let outcome = dispatcher.dispatch().await?;
    Ok(Json(outcome))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}
