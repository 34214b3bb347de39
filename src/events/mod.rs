//! Lifecycle events and the on-chain event stream
//!
//! - `bus`: typed publish/subscribe channels consumers listen on
//! - `listener`: background polling loop over on-chain renewal activity
//! - `rpc`: JSON-RPC event source used by the listener

mod bus;
mod listener;
mod rpc;

pub use bus::EventBus;
pub use listener::{
    classify, CursorSink, EventCursor, EventListener, ListenerConfig, ListenerHandle,
    ListenerState,
};
pub use rpc::{ChainEvent, EventBatch, EventSource, RpcEventSource};

use serde::{Deserialize, Serialize};

use crate::bulk::BulkReport;
use crate::types::{BlockchainSync, GiftCardAttachment, Subscription};

/// Kind of subscription lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    Created,
    Updated,
    Cancelled,
    Deleted,
    Failed,
}

/// Outcome of a subscription mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: LifecycleEventType,
    /// Empty when a create failed before the server assigned an id
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Subscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainSync>,
}

impl LifecycleEvent {
    pub fn failed(subscription_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            event_type: LifecycleEventType::Failed,
            subscription_id: subscription_id.into(),
            data: None,
            error: Some(error.into()),
            blockchain: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardEventType {
    Attached,
    Failed,
}

/// Outcome of a gift card attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardEvent {
    #[serde(rename = "type")]
    pub event_type: GiftCardEventType,
    pub subscription_id: String,
    pub gift_card_hash: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<GiftCardAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where an on-chain event was observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPosition {
    /// Stream-unique event id; handle events idempotently by this id
    pub event_id: String,
    pub contract_id: String,
    pub ledger: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_closed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

/// A renewal was attempted on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalAttempt {
    pub subscription_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(flatten)]
    pub position: ChainPosition,
}

/// A spending approval was recorded on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGranted {
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ledger: Option<u64>,
    #[serde(flatten)]
    pub position: ChainPosition,
}

/// A renewal attempt failed on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalFailed {
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(flatten)]
    pub position: ChainPosition,
}

impl RenewalFailed {
    /// The attempt record every failure implies
    pub fn as_attempt(&self) -> RenewalAttempt {
        RenewalAttempt {
            subscription_id: self.subscription_id.clone(),
            success: false,
            amount: self.amount.clone(),
            position: self.position.clone(),
        }
    }
}

/// Error raised by the event stream; the stream keeps running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Every event published on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    Subscription(LifecycleEvent),
    GiftCard(GiftCardEvent),
    RenewalAttempt(RenewalAttempt),
    ApprovalGranted(ApprovalGranted),
    RenewalFailed(RenewalFailed),
    EventError(EventError),
    Bulk(BulkReport),
}
