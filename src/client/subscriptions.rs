//! Subscription CRUD client
//!
//! Every mutating call validates locally, attaches auth/idempotency/version
//! headers, and publishes exactly one lifecycle event when it resolves.
//! Failures of any kind (validation, HTTP, transport, timeout) come back as a
//! [`SubscriptionResult`] with `success: false`; nothing is raised past the
//! client.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, IF_MATCH, USER_AGENT};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::events::{
    EventBus, EventListener, LifecycleEvent, LifecycleEventType, ListenerConfig, ListenerHandle,
    SdkEvent,
};
use crate::types::{
    ApiEnvelope, BlockchainSync, CreatePayload, MutationOptions, Subscription,
    SubscriptionCreateInput, SubscriptionResult, SubscriptionStatus, SubscriptionUpdateInput,
};
use crate::validation::{validate_create, validate_update};

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Resolves the bearer token for each request
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated
    async fn token(&self) -> Option<String>;
}

/// Fixed bearer token
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Raw response from the request helper
pub(crate) struct ApiResponse {
    pub status: u16,
    pub body: ApiEnvelope<Value>,
}

impl ApiResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Split a 2xx body into data and blockchain outcome, or turn a non-2xx
    /// into an HTTP error using the server message when there is one
    fn into_payload(self, fallback: impl FnOnce(u16) -> String) -> Result<(Option<Value>, Option<BlockchainSync>)> {
        if !self.is_success() {
            let message = self
                .body
                .error
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| fallback(self.status));
            return Err(SdkError::Http {
                status: self.status,
                message,
            });
        }
        Ok((self.body.data, self.body.blockchain))
    }
}

fn status_fallback(status: u16) -> String {
    format!("Request failed with status {}", status)
}

fn decode_subscription(data: Option<Value>) -> Result<Option<Subscription>> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// HTTP client for the subscription API
///
/// # Example
///
/// ```rust,no_run
/// use syncro_sdk::{MutationOptions, SdkConfig, SubscriptionCreateInput, SyncClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SyncClient::new(SdkConfig::new("https://api.syncro.example"))?;
/// let mut events = client.events().subscribe_subscription();
///
/// let result = client
///     .create_subscription(
///         &SubscriptionCreateInput::new("Netflix", 15.99, "monthly"),
///         MutationOptions::default().with_idempotency_key("create-netflix-1"),
///     )
///     .await;
///
/// if let Some(warning) = result.blockchain_warning() {
///     eprintln!("saved, but not mirrored on-chain: {warning}");
/// }
/// let event = events.recv().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncClient {
    config: SdkConfig,
    http: Client,
    credentials: Option<Arc<dyn CredentialProvider>>,
    bus: EventBus,
}

impl SyncClient {
    /// Create a client with its own HTTP connection pool
    pub fn new(config: SdkConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_http_client(config, http))
    }

    /// Create a client over a preconfigured `reqwest::Client`, e.g. one with
    /// a cookie store for cookie-based auth
    pub fn with_http_client(config: SdkConfig, http: Client) -> Self {
        Self {
            config,
            http,
            credentials: None,
            bus: EventBus::new(),
        }
    }

    /// Attach a bearer token provider
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Publish into an existing bus instead of a private one
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Event channels this client publishes into
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Start following on-chain renewal/approval events on this client's bus
    ///
    /// Must be called inside a tokio runtime.
    pub fn listen_to_events(&self, config: ListenerConfig) -> Result<ListenerHandle> {
        Ok(EventListener::new(config, self.bus.clone())?.start())
    }

    // ==================== Subscription API ====================

    /// Create a subscription
    ///
    /// Without an idempotency key a retried call may create a duplicate.
    pub async fn create_subscription(
        &self,
        input: &SubscriptionCreateInput,
        options: MutationOptions,
    ) -> SubscriptionResult {
        let validation = validate_create(input);
        if let Some(message) = validation.first_error() {
            return self.fail("", SdkError::Validation(message.to_string()));
        }

        let payload = CreatePayload::from(input);
        let response = self
            .request(
                Method::POST,
                "/api/subscriptions",
                Some(&payload),
                options.idempotency_key.as_deref(),
                None,
            )
            .await;

        match response
            .and_then(|r| r.into_payload(status_fallback))
            .and_then(|(data, chain)| Ok((decode_subscription(data)?, chain)))
        {
            Ok((data, chain)) => {
                let id = data.as_ref().map(|s| s.id.clone()).unwrap_or_default();
                self.succeed(LifecycleEventType::Created, id, data, chain)
            }
            Err(e) => self.fail("", e),
        }
    }

    /// Fetch one subscription; read-only, publishes no events
    pub async fn get_subscription(&self, subscription_id: &str) -> SubscriptionResult {
        if subscription_id.trim().is_empty() {
            return SubscriptionResult::failed(&missing_id());
        }

        let response = self
            .request::<()>(Method::GET, &subscription_path(subscription_id), None, None, None)
            .await;

        match response
            .and_then(|r| r.into_payload(|_| "Failed to fetch subscription".to_string()))
            .and_then(|(data, _)| decode_subscription(data))
        {
            Ok(data) => SubscriptionResult::ok(data, None),
            Err(e) => {
                debug!(subscription_id, error = %e, "Fetch failed");
                SubscriptionResult::failed(&e)
            }
        }
    }

    /// Apply a partial update
    ///
    /// `options.if_match` is sent as `If-Match`; the server rejects the
    /// update with a conflict when the record version moved on.
    pub async fn update_subscription(
        &self,
        subscription_id: &str,
        input: &SubscriptionUpdateInput,
        options: MutationOptions,
    ) -> SubscriptionResult {
        if subscription_id.trim().is_empty() {
            return self.fail(subscription_id, missing_id());
        }
        let validation = validate_update(input);
        if let Some(message) = validation.first_error() {
            return self.fail(subscription_id, SdkError::Validation(message.to_string()));
        }

        self.patch(
            LifecycleEventType::Updated,
            subscription_id,
            input,
            options.idempotency_key.as_deref(),
            options.if_match,
        )
        .await
    }

    /// Cancel a subscription by setting its status to `cancelled`
    pub async fn cancel_subscription(&self, subscription_id: &str) -> SubscriptionResult {
        self.set_status(subscription_id, SubscriptionStatus::Cancelled, LifecycleEventType::Cancelled)
            .await
    }

    /// Pause a subscription; published as an `updated` event
    pub async fn pause_subscription(&self, subscription_id: &str) -> SubscriptionResult {
        self.set_status(subscription_id, SubscriptionStatus::Paused, LifecycleEventType::Updated)
            .await
    }

    /// Delete a subscription
    pub async fn delete_subscription(&self, subscription_id: &str) -> SubscriptionResult {
        self.delete_subscription_with(subscription_id, MutationOptions::default())
            .await
    }

    /// Delete with an idempotency key; version preconditions are not
    /// supported on delete and `options.if_match` is ignored
    pub async fn delete_subscription_with(
        &self,
        subscription_id: &str,
        options: MutationOptions,
    ) -> SubscriptionResult {
        if subscription_id.trim().is_empty() {
            return self.fail(subscription_id, missing_id());
        }

        let response = self
            .request::<()>(
                Method::DELETE,
                &subscription_path(subscription_id),
                None,
                options.idempotency_key.as_deref(),
                None,
            )
            .await;

        match response.and_then(|r| r.into_payload(status_fallback)) {
            Ok((_, chain)) => self.succeed(
                LifecycleEventType::Deleted,
                subscription_id.to_string(),
                None,
                chain,
            ),
            Err(e) => self.fail(subscription_id, e),
        }
    }

    // ==================== Timeouts ====================

    /// Race a call against a timer
    ///
    /// On expiry the call is dropped (the server may still apply it), a
    /// `failed` event is published and the result is a timeout failure.
    pub async fn with_timeout<T, F>(
        &self,
        subscription_id: &str,
        duration: Duration,
        call: F,
    ) -> SubscriptionResult<T>
    where
        F: Future<Output = SubscriptionResult<T>>,
    {
        match tokio::time::timeout(duration, call).await {
            Ok(result) => result,
            Err(_) => {
                let err = SdkError::Timeout(duration);
                warn!(subscription_id, ?duration, "Subscription call timed out");
                self.bus.publish(SdkEvent::Subscription(LifecycleEvent::failed(
                    subscription_id,
                    err.to_string(),
                )));
                SubscriptionResult::failed(&err)
            }
        }
    }

    /// `with_timeout` using the configured operation timeout
    pub async fn with_default_timeout<T, F>(&self, subscription_id: &str, call: F) -> SubscriptionResult<T>
    where
        F: Future<Output = SubscriptionResult<T>>,
    {
        self.with_timeout(subscription_id, self.config.operation_timeout, call)
            .await
    }

    // === Private Implementation ===

    async fn set_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        event_type: LifecycleEventType,
    ) -> SubscriptionResult {
        if subscription_id.trim().is_empty() {
            return self.fail(subscription_id, missing_id());
        }
        let input = SubscriptionUpdateInput::status(status);
        self.patch(event_type, subscription_id, &input, None, None).await
    }

    async fn patch(
        &self,
        event_type: LifecycleEventType,
        subscription_id: &str,
        input: &SubscriptionUpdateInput,
        idempotency_key: Option<&str>,
        if_match: Option<u64>,
    ) -> SubscriptionResult {
        let response = self
            .request(
                Method::PATCH,
                &subscription_path(subscription_id),
                Some(input),
                idempotency_key,
                if_match,
            )
            .await;

        match response
            .and_then(|r| r.into_payload(status_fallback))
            .and_then(|(data, chain)| Ok((decode_subscription(data)?, chain)))
        {
            Ok((data, chain)) => {
                self.succeed(event_type, subscription_id.to_string(), data, chain)
            }
            Err(e) => self.fail(subscription_id, e),
        }
    }

    /// Resolve request headers shared by every call
    pub(crate) async fn base_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.normalized_base_url(), path);
        let mut request = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(agent) = &self.config.user_agent {
            request = request.header(USER_AGENT, agent.as_str());
        }
        if let Some(provider) = &self.credentials {
            if let Some(token) = provider.token().await {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }
        request
    }

    /// Map a reqwest failure, reporting timeouts against the configured deadline
    pub(crate) fn transport_error(&self, err: reqwest::Error) -> SdkError {
        if err.is_timeout() {
            SdkError::Timeout(self.config.request_timeout)
        } else {
            err.into()
        }
    }

    /// Issue a request and read the `{data, error, blockchain}` envelope
    ///
    /// Transport failures and undecodable 2xx bodies come back as errors; an
    /// empty or non-JSON error body is read as `{}`.
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
        if_match: Option<u64>,
    ) -> Result<ApiResponse> {
        debug!(%method, path, "Sending subscription request");

        let mut request = self.base_request(method, path).await;
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key);
        }
        if let Some(version) = if_match {
            request = request.header(IF_MATCH, version.to_string());
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        let body = if text.trim().is_empty() {
            ApiEnvelope::default()
        } else {
            match serde_json::from_str::<ApiEnvelope<Value>>(&text) {
                Ok(body) => body,
                Err(e) if (200..300).contains(&status) => return Err(e.into()),
                Err(_) => ApiEnvelope::default(),
            }
        };

        Ok(ApiResponse { status, body })
    }

    fn succeed(
        &self,
        event_type: LifecycleEventType,
        subscription_id: String,
        data: Option<Subscription>,
        blockchain: Option<BlockchainSync>,
    ) -> SubscriptionResult {
        match &blockchain {
            Some(chain) if !chain.synced => warn!(
                subscription_id = %subscription_id,
                error = chain.error.as_deref().unwrap_or("unknown"),
                "Mutation applied but blockchain sync failed"
            ),
            _ => info!(subscription_id = %subscription_id, ?event_type, "Subscription mutation applied"),
        }

        self.bus.publish(SdkEvent::Subscription(LifecycleEvent {
            event_type,
            subscription_id,
            data: data.clone(),
            error: None,
            blockchain: blockchain.clone(),
        }));
        SubscriptionResult::ok(data, blockchain)
    }

    fn fail(&self, subscription_id: &str, err: SdkError) -> SubscriptionResult {
        warn!(subscription_id, kind = ?err.kind(), error = %err, "Subscription call failed");
        self.bus.publish(SdkEvent::Subscription(LifecycleEvent::failed(
            subscription_id,
            err.to_string(),
        )));
        SubscriptionResult::failed(&err)
    }
}

pub(crate) fn subscription_path(subscription_id: &str) -> String {
    format!("/api/subscriptions/{}", urlencoding::encode(subscription_id))
}

fn missing_id() -> SdkError {
    SdkError::Validation("Subscription ID is required".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    fn envelope(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            status,
            body: serde_json::from_value(body).unwrap(),
        }
    }

    #[test]
    fn test_error_message_prefers_server_body() {
        let err = envelope(500, json!({ "error": "db down" }))
            .into_payload(status_fallback)
            .unwrap_err();
        assert_eq!(
            err,
            SdkError::Http {
                status: 500,
                message: "db down".into()
            }
        );
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let err = envelope(503, json!({})).into_payload(status_fallback).unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 503");
    }

    #[test]
    fn test_path_encodes_id() {
        assert_eq!(subscription_path("a/b c"), "/api/subscriptions/a%2Fb%20c");
    }

    #[tokio::test]
    async fn test_validation_failure_publishes_failed_event() {
        let client = SyncClient::new(SdkConfig::new("http://127.0.0.1:9")).unwrap();
        let mut events = client.events().subscribe_subscription();

        let input = SubscriptionCreateInput::new("", 10.0, "monthly");
        let result = client.create_subscription(&input, MutationOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert_eq!(result.error.as_deref(), Some("Subscription name is required"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, LifecycleEventType::Failed);
        assert_eq!(event.subscription_id, "");
    }

    #[tokio::test]
    async fn test_get_requires_id_without_event() {
        let client = SyncClient::new(SdkConfig::default()).unwrap();
        let mut events = client.events().subscribe_subscription();

        let result = client.get_subscription("  ").await;
        assert_eq!(result.error.as_deref(), Some("Subscription ID is required"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_reports_timeout_kind() {
        let client = SyncClient::new(SdkConfig::default()).unwrap();
        let mut events = client.events().subscribe_subscription();

        let result: SubscriptionResult = client
            .with_timeout("sub-1", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                SubscriptionResult::ok(None, None)
            })
            .await;

        assert!(result.is_timeout());
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, LifecycleEventType::Failed);
        assert_eq!(event.subscription_id, "sub-1");
    }
}
