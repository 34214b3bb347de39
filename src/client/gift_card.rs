//! Gift card attachment
//!
//! Attachment has its own event channel and its own request path: it catches
//! transport failures itself and never publishes a `subscription` event.

use reqwest::Method;
use serde::Serialize;
use tracing::{info, warn};

use super::subscriptions::{subscription_path, SyncClient};
use crate::error::SdkError;
use crate::events::{GiftCardEvent, GiftCardEventType, SdkEvent};
use crate::types::{ApiEnvelope, AttachGiftCardRequest, BlockchainSync, GiftCardAttachment};
use crate::validation::validate_gift_card_hash;

/// Outcome of [`SyncClient::attach_gift_card`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachGiftCardResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<GiftCardAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainSync>,
}

impl AttachGiftCardResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            blockchain: None,
        }
    }
}

impl SyncClient {
    /// Bind a gift card hash to a subscription
    ///
    /// The hash must be 32–64 hex characters and the provider non-blank;
    /// both are checked before any request is made.
    pub async fn attach_gift_card(
        &self,
        subscription_id: &str,
        gift_card_hash: &str,
        provider: &str,
    ) -> AttachGiftCardResult {
        if !validate_gift_card_hash(gift_card_hash) {
            return self.gift_card_failed(
                subscription_id,
                gift_card_hash,
                provider,
                "Invalid gift card format. Hash must be 32-64 hex characters.",
            );
        }
        let provider = provider.trim();
        if provider.is_empty() {
            return self.gift_card_failed(
                subscription_id,
                gift_card_hash,
                provider,
                "Provider is required",
            );
        }
        if subscription_id.trim().is_empty() {
            return self.gift_card_failed(
                subscription_id,
                gift_card_hash,
                provider,
                "Subscription ID is required",
            );
        }

        let path = format!("{}/attach-gift-card", subscription_path(subscription_id));
        let body = AttachGiftCardRequest {
            gift_card_hash,
            provider,
        };

        let response = match self
            .base_request(Method::POST, &path)
            .await
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error = self.transport_error(e).to_string();
                return self.gift_card_failed(subscription_id, gift_card_hash, provider, error);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let error = self.transport_error(e).to_string();
                return self.gift_card_failed(subscription_id, gift_card_hash, provider, error);
            }
        };

        if !status.is_success() {
            let error = serde_json::from_str::<ApiEnvelope<GiftCardAttachment>>(&text)
                .ok()
                .and_then(|envelope| envelope.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return self.gift_card_failed(subscription_id, gift_card_hash, provider, error);
        }

        let envelope: ApiEnvelope<GiftCardAttachment> = if text.trim().is_empty() {
            ApiEnvelope::default()
        } else {
            match serde_json::from_str(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let error = SdkError::from(e).to_string();
                    return self.gift_card_failed(subscription_id, gift_card_hash, provider, error);
                }
            }
        };

        info!(subscription_id, provider, "Gift card attached");
        self.bus_publish_gift_card(GiftCardEvent {
            event_type: GiftCardEventType::Attached,
            subscription_id: subscription_id.to_string(),
            gift_card_hash: gift_card_hash.to_string(),
            provider: provider.to_string(),
            data: envelope.data.clone(),
            error: None,
        });

        AttachGiftCardResult {
            success: true,
            data: envelope.data,
            error: None,
            blockchain: envelope.blockchain,
        }
    }

    fn gift_card_failed(
        &self,
        subscription_id: &str,
        gift_card_hash: &str,
        provider: &str,
        error: impl Into<String>,
    ) -> AttachGiftCardResult {
        let error = error.into();
        warn!(subscription_id, error = %error, "Gift card attachment failed");
        self.bus_publish_gift_card(GiftCardEvent {
            event_type: GiftCardEventType::Failed,
            subscription_id: subscription_id.to_string(),
            gift_card_hash: gift_card_hash.to_string(),
            provider: provider.to_string(),
            data: None,
            error: Some(error.clone()),
        });
        AttachGiftCardResult::failed(error)
    }

    fn bus_publish_gift_card(&self, event: GiftCardEvent) {
        self.events().publish(SdkEvent::GiftCard(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdkConfig;

    #[tokio::test]
    async fn test_invalid_hash_fails_before_network() {
        // Port 9 (discard) is never contacted: validation fails first
        let client = SyncClient::new(SdkConfig::new("http://127.0.0.1:9")).unwrap();
        let mut gift_cards = client.events().subscribe_gift_card();
        let mut lifecycle = client.events().subscribe_subscription();

        let hash = format!("zz11{}", "a".repeat(28));
        let result = client.attach_gift_card("sub-1", &hash, "Steam").await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Invalid gift card format. Hash must be 32-64 hex characters.")
        );
        let event = gift_cards.try_recv().unwrap();
        assert_eq!(event.event_type, GiftCardEventType::Failed);
        assert_eq!(event.gift_card_hash, hash);
        assert!(lifecycle.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blank_provider_rejected() {
        let client = SyncClient::new(SdkConfig::new("http://127.0.0.1:9")).unwrap();
        let mut gift_cards = client.events().subscribe_gift_card();

        let result = client.attach_gift_card("sub-1", &"ab".repeat(16), "   ").await;

        assert_eq!(result.error.as_deref(), Some("Provider is required"));
        assert_eq!(gift_cards.try_recv().unwrap().provider, "");
    }
}
