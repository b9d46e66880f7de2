//! Due-subscription evaluation and push fan-out.

use crate::billing::cycle::compute_next_billing;
use crate::error::Result;
use crate::push::{DeliveryOutcome, NotificationPayload, PayloadData, PushClient};
use crate::storage::{PushEndpoint, PushEndpointStore, Subscription, SubscriptionStore};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counters returned by one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Subscriptions examined.
    pub evaluated: usize,
    /// Subscriptions whose reminder fires today.
    pub due: usize,
    /// Deliveries accepted by a push service.
    pub sent: usize,
    /// Deliveries rejected or erroring (other than gone endpoints).
    pub failed: usize,
    /// Dead endpoints pruned.
    pub removed: usize,
    /// Subscriptions whose stored billing fields were refreshed.
    pub updated: usize,
}

/// Evaluates every subscription and fans reminders out to the owner's
/// registered push endpoints.
///
/// Safe to invoke repeatedly: a subscription is due only while its day count
/// exactly equals its notice window and it has not been stamped today, so
/// re-runs after the watermark is set send nothing. Per-endpoint failures are
/// absorbed into the returned counters; only a store outage aborts the pass.
pub struct NotificationDispatcher<S, P> {
    store: S,
    push: P,
}

impl<S, P> NotificationDispatcher<S, P>
where
    S: SubscriptionStore + PushEndpointStore,
    P: PushClient,
{
    #[must_use]
    pub fn new(store: S, push: P) -> Self {
        Self { store, push }
    }

    /// Run one dispatch pass.
    pub async fn dispatch(&self) -> Result<DispatchOutcome> {
        let today = Utc::now().date_naive();
        let subscriptions = self.store.list_subscriptions().await?;

        let mut outcome = DispatchOutcome {
            evaluated: subscriptions.len(),
            ..DispatchOutcome::default()
        };

        let mut due: Vec<(String, Subscription)> = Vec::new();

        for mut sub in subscriptions {
            let Some(user_id) = sub.user_id.clone() else {
                continue;
            };

            // Self-correct stale billing fields while we are here, so stored
            // rows never need a separate migration pass.
            let computed = compute_next_billing(&sub.first_payment_date, sub.cycle);
            if computed.next_billing_at != sub.next_billing_at
                || computed.days_until_next_billing != sub.days_until_next_billing
            {
                self.store.update_billing(sub.id, &computed).await?;
                sub.next_billing_at = computed.next_billing_at.clone();
                sub.days_until_next_billing = computed.days_until_next_billing;
                outcome.updated += 1;
            }

            if sub.notify_days_before < 0 {
                continue;
            }
            if computed.days_until_next_billing != sub.notify_days_before {
                continue;
            }
            if sub
                .last_notified_at
                .is_some_and(|at| at.date_naive() == today)
            {
                continue;
            }

            due.push((user_id, sub));
        }

        outcome.due = due.len();
        if due.is_empty() {
            return Ok(outcome);
        }

        // One endpoint lookup across all due owners, not one per subscription.
        let mut user_ids: Vec<String> = Vec::new();
        for (user_id, _) in &due {
            if !user_ids.contains(user_id) {
                user_ids.push(user_id.clone());
            }
        }
        let endpoints = self.store.endpoints_for_users(&user_ids).await?;
        let mut by_user: HashMap<String, Vec<PushEndpoint>> = HashMap::new();
        for endpoint in endpoints {
            by_user
                .entry(endpoint.user_id.clone())
                .or_default()
                .push(endpoint);
        }

        for (user_id, sub) in &due {
            let Some(user_endpoints) = by_user.get(user_id) else {
                // No endpoint, no stamp: the subscription stays eligible
                // until the user registers one.
                continue;
            };

            let payload = build_payload(sub, today);

            for endpoint in user_endpoints {
                match self.push.send(endpoint, &payload).await {
                    Ok(DeliveryOutcome::Delivered) => outcome.sent += 1,
                    Ok(DeliveryOutcome::Gone) => {
                        self.store.delete_endpoint(endpoint.id).await?;
                        outcome.removed += 1;
                    }
                    Ok(DeliveryOutcome::Rejected) => outcome.failed += 1,
                    Err(err) => {
                        tracing::error!(
                            subscription_id = sub.id,
                            endpoint = %endpoint.endpoint,
                            error = %err,
                            "failed to send push notification"
                        );
                        outcome.failed += 1;
                    }
                }
            }

            // Stamped once per subscription after all endpoint attempts,
            // regardless of individual outcomes.
            self.store.mark_notified(sub.id, Utc::now()).await?;
        }

        Ok(outcome)
    }
}

fn build_payload(sub: &Subscription, today: NaiveDate) -> NotificationPayload {
    let when = if sub.notify_days_before == 0 {
        "payment is due today.".to_string()
    } else {
        format!("{} days until the next payment.", sub.notify_days_before)
    };

    NotificationPayload {
        title: "Subscription payment reminder".to_string(),
        body: format!("{}: {}", sub.service_name, when),
        icon: crate::push::DEFAULT_ICON.to_string(),
        tag: format!("subscription-{}-{}", sub.id, today.format("%Y-%m-%d")),
        data: PayloadData {
            url: crate::push::DEFAULT_URL.to_string(),
            subscription_id: Some(sub.id),
        },
    }
}
