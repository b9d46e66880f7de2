//! Live web-push delivery.
//!
//! Signs each message with the configured VAPID key pair and hands it to the
//! push service named by the endpoint URL. Endpoint-gone responses map to
//! [`DeliveryOutcome::Gone`] so the dispatcher can prune the registration.

use crate::config::PushConfig;
use crate::error::{Result, SubtrackError};
use crate::push::{DeliveryOutcome, NotificationPayload, PushClient};
use crate::storage::PushEndpoint;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, URL_SAFE_NO_PAD,
    VapidSignatureBuilder, WebPushClient as _, WebPushError, WebPushMessageBuilder,
};

/// Production push client over the web-push protocol.
#[derive(Clone)]
pub struct WebPushDelivery {
    config: PushConfig,
    client: Arc<HyperWebPushClient>,
}

impl WebPushDelivery {
    /// Create a delivery client from push configuration.
    ///
    /// Key presence is not checked here; sending without a configured key
    /// pair fails with an internal error. Callers that want to fail earlier
    /// (such as the dispatch trigger endpoint) check
    /// [`PushConfig::signing_configured`] first.
    #[must_use]
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            client: Arc::new(HyperWebPushClient::new()),
        }
    }
}

#[async_trait]
impl PushClient for WebPushDelivery {
    async fn send(
        &self,
        endpoint: &PushEndpoint,
        payload: &NotificationPayload,
    ) -> Result<DeliveryOutcome> {
        let private_key = self
            .config
            .vapid_private_key
            .as_ref()
            .ok_or_else(|| SubtrackError::internal("VAPID keys are not configured"))?;

        let info = SubscriptionInfo::new(
            endpoint.endpoint.clone(),
            endpoint.p256dh.clone(),
            endpoint.auth.clone(),
        );

        let mut signature = VapidSignatureBuilder::from_base64(
            private_key.expose_secret(),
            URL_SAFE_NO_PAD,
            &info,
        )
        .map_err(|e| SubtrackError::internal(format!("invalid VAPID private key: {e}")))?;
        signature.add_claim("sub", self.config.vapid_subject.clone());
        let signature = signature
            .build()
            .map_err(|e| SubtrackError::internal(format!("failed to sign push message: {e}")))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| SubtrackError::internal(format!("failed to encode push payload: {e}")))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_ttl(self.config.ttl_seconds);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        builder.set_vapid_signature(signature);
        let message = builder
            .build()
            .map_err(|e| SubtrackError::internal(format!("failed to build push message: {e}")))?;

        match self.client.send(message).await {
            Ok(()) => Ok(DeliveryOutcome::Delivered),
            Err(WebPushError::EndpointNotFound | WebPushError::EndpointNotValid) => {
                Ok(DeliveryOutcome::Gone)
            }
            Err(err) => {
                tracing::warn!(
                    endpoint = %endpoint.endpoint,
                    error = %err,
                    "push service rejected delivery"
                );
                Ok(DeliveryOutcome::Rejected)
            }
        }
    }
}
