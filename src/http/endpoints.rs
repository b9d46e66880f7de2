//! Push endpoint registration.
//!
//! A browser posts its push subscription here after the user opts in; the
//! record is upserted on owner + endpoint URL so re-registration from the
//! same browser rotates keys in place. DELETE removes the registration when
//! the user opts back out.

use crate::error::{Result, SubtrackError};
use crate::http::{Ack, AppContext, SessionPrincipal};
use crate::push::PushClient;
use crate::storage::{EndpointRegistration, PushEndpointStore, SubscriptionStore};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::Deserialize;

/// Registration payload as browsers serialize a `PushSubscription`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPayload {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub expiration_time: Option<f64>,
    #[serde(default)]
    pub keys: Option<EndpointKeys>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndpointKeys {
    #[serde(default)]
    pub p256dh: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

pub async fn register<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
    headers: HeaderMap,
    Json(payload): Json<EndpointPayload>,
) -> Result<Json<Ack>>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let keys = payload.keys.unwrap_or_default();
    let (Some(endpoint), Some(p256dh), Some(auth)) = (payload.endpoint, keys.p256dh, keys.auth)
    else {
        return Err(SubtrackError::bad_request("invalid subscription payload"));
    };

    ctx.store
        .upsert_endpoint(EndpointRegistration {
            user_id: principal.user_id,
            endpoint,
            p256dh,
            auth,
            expiration_time: payload.expiration_time.map(|t| t.trunc() as i64),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
        })
        .await?;

    Ok(Json(Ack::ok()))
}

pub async fn unregister<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
    Json(payload): Json<EndpointPayload>,
) -> Result<Json<Ack>>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let Some(endpoint) = payload.endpoint else {
        return Err(SubtrackError::bad_request("invalid subscription payload"));
    };

    ctx.store
        .delete_endpoint_for_user(&principal.user_id, &endpoint)
        .await?;

    Ok(Json(Ack::ok()))
}
