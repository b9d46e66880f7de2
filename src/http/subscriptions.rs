//! Subscription submission endpoints.
//!
//! The POST endpoint is what the offline sync client replays against, so its
//! envelope carries the owner's full refreshed list: the client folds that
//! straight back into its cache. Update and delete mirror the interactive
//! form actions and reply with the same envelope.

use crate::billing::{compute_next_billing, parse_calendar_date, CycleUnit};
use crate::error::Result;
use crate::http::{AppContext, SessionPrincipal, SubmitData, SubmitEnvelope};
use crate::offline::SubscriptionDraft;
use crate::push::PushClient;
use crate::storage::{
    NewSubscription, PushEndpointStore, Subscription, SubscriptionChanges, SubscriptionStore,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::Form;
use serde::Deserialize;

/// Form fields of a subscription submission. `tags` may repeat.
#[derive(Debug, Deserialize)]
pub struct SubscriptionForm {
    pub service_name: String,
    pub cycle: String,
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

/// Validate a submitted form into a draft, or a user-facing message.
fn validate(form: SubscriptionForm) -> std::result::Result<SubscriptionDraft, String> {
    let service_name = form.service_name.trim().to_string();
    if service_name.is_empty() {
        return Err("service name is required".to_string());
    }
    if parse_calendar_date(&form.first_payment_date).is_none() {
        return Err("first payment date is not a valid date".to_string());
    }
    if form.amount < 0 {
        return Err("amount must not be negative".to_string());
    }
    if form.notify_days_before < 0 {
        return Err("notify window must not be negative".to_string());
    }

    let tags = form
        .tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(SubscriptionDraft {
        service_name,
        cycle: CycleUnit::from_str(&form.cycle),
        amount: form.amount,
        first_payment_date: form.first_payment_date,
        notify_days_before: form.notify_days_before,
        tags,
    })
}

fn rejection(message: String) -> (StatusCode, Json<SubmitEnvelope>) {
    (
        StatusCode::BAD_REQUEST,
        Json(SubmitEnvelope::Error {
            message: Some(message),
        }),
    )
}

async fn owner_list<S>(store: &S, user_id: &str) -> Result<Vec<Subscription>>
where
    S: SubscriptionStore,
{
    store.subscriptions_for_user(user_id).await
}

pub async fn submit<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
    Form(form): Form<SubscriptionForm>,
) -> Result<(StatusCode, Json<SubmitEnvelope>)>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let draft = match validate(form) {
        Ok(draft) => draft,
        Err(message) => return Ok(rejection(message)),
    };

    let computed = compute_next_billing(&draft.first_payment_date, draft.cycle);
    ctx.store
        .create_subscription(NewSubscription {
            user_id: principal.user_id.clone(),
            service_name: draft.service_name,
            cycle: draft.cycle,
            amount: draft.amount,
            first_payment_date: draft.first_payment_date,
            next_billing_at: computed.next_billing_at,
            days_until_next_billing: computed.days_until_next_billing,
            notify_days_before: draft.notify_days_before,
            tags: draft.tags,
        })
        .await?;

    let subscriptions = owner_list(&ctx.store, &principal.user_id).await?;
    Ok((
        StatusCode::OK,
        Json(SubmitEnvelope::Success {
            data: Some(SubmitData { subscriptions }),
        }),
    ))
}

/// The owner's subscriptions with billing fields refreshed; drifted rows are
/// persisted in passing, the same self-correction the dispatcher applies.
pub async fn list<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
) -> Result<Json<SubmitData>>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let mut subscriptions = owner_list(&ctx.store, &principal.user_id).await?;
    for sub in &mut subscriptions {
        let computed = compute_next_billing(&sub.first_payment_date, sub.cycle);
        if computed.next_billing_at != sub.next_billing_at
            || computed.days_until_next_billing != sub.days_until_next_billing
        {
            ctx.store.update_billing(sub.id, &computed).await?;
            sub.next_billing_at = computed.next_billing_at;
            sub.days_until_next_billing = computed.days_until_next_billing;
        }
    }
    Ok(Json(SubmitData { subscriptions }))
}

pub async fn update<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
    Path(id): Path<i64>,
    Form(form): Form<SubscriptionForm>,
) -> Result<(StatusCode, Json<SubmitEnvelope>)>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    let draft = match validate(form) {
        Ok(draft) => draft,
        Err(message) => return Ok(rejection(message)),
    };

    let computed = compute_next_billing(&draft.first_payment_date, draft.cycle);
    ctx.store
        .update_subscription(
            id,
            &principal.user_id,
            SubscriptionChanges {
                service_name: draft.service_name,
                cycle: draft.cycle,
                amount: draft.amount,
                first_payment_date: draft.first_payment_date,
                next_billing_at: computed.next_billing_at,
                days_until_next_billing: computed.days_until_next_billing,
                notify_days_before: draft.notify_days_before,
                tags: draft.tags,
            },
        )
        .await?;

    let subscriptions = owner_list(&ctx.store, &principal.user_id).await?;
    Ok((
        StatusCode::OK,
        Json(SubmitEnvelope::Success {
            data: Some(SubmitData { subscriptions }),
        }),
    ))
}

pub async fn remove<S, P>(
    State(ctx): State<AppContext<S, P>>,
    principal: SessionPrincipal,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<SubmitEnvelope>)>
where
    S: SubscriptionStore + PushEndpointStore + Clone + Send + Sync + 'static,
    P: PushClient + Clone + Send + Sync + 'static,
{
    ctx.store
        .delete_subscription(id, &principal.user_id)
        .await?;

    let subscriptions = owner_list(&ctx.store, &principal.user_id).await?;
    Ok((
        StatusCode::OK,
        Json(SubmitEnvelope::Success {
            data: Some(SubmitData { subscriptions }),
        }),
    ))
}
