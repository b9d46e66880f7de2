//! HTTP implementation of the submission port.

use crate::error::{Result, SubtrackError};
use crate::http::SubmitEnvelope;
use crate::offline::cache::SubmitClient;
use crate::offline::store::SubscriptionDraft;
use async_trait::async_trait;
use reqwest::header::ACCEPT;

/// Submits queued drafts to the subscription endpoint as form posts.
#[derive(Clone)]
pub struct HttpSubmitClient {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpSubmitClient {
    /// Create a client posting to the given submission endpoint URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured reqwest client (cookies, proxies, timeouts).
    #[must_use]
    pub fn with_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl SubmitClient for HttpSubmitClient {
    async fn submit(&self, draft: &SubscriptionDraft) -> Result<SubmitEnvelope> {
        let mut form: Vec<(&str, String)> = vec![
            ("service_name", draft.service_name.clone()),
            ("cycle", draft.cycle.to_string()),
            ("amount", draft.amount.to_string()),
            ("first_payment_date", draft.first_payment_date.clone()),
            ("notify_days_before", draft.notify_days_before.to_string()),
        ];
        for tag in &draft.tags {
            form.push(("tags", tag.clone()));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| SubtrackError::internal(format!("submission request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SubtrackError::internal(format!(
                "submission endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<SubmitEnvelope>()
            .await
            .map_err(|e| SubtrackError::internal(format!("malformed submission response: {e}")))
    }
}
