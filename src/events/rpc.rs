//! JSON-RPC event source for on-chain contract events
//!
//! Speaks the Soroban RPC `getEvents` / `getLatestLedger` methods, asking for
//! topics and values decoded as JSON (`xdrFormat: "json"`).

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::listener::EventCursor;
use crate::error::{Result, SdkError};

/// A raw contract event as returned by the RPC node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// Stream position of this event, usable as a cursor
    pub id: String,
    #[serde(default)]
    pub ledger: u64,
    #[serde(default)]
    pub ledger_closed_at: Option<String>,
    #[serde(default)]
    pub contract_id: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(rename = "topicJson", alias = "topic", default)]
    pub topic: Vec<Value>,
    #[serde(rename = "valueJson", alias = "value", default)]
    pub value: Value,
}

/// One page of events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub events: Vec<ChainEvent>,
    /// Position after the last scanned event, when the source reports one
    pub cursor: Option<EventCursor>,
    pub latest_ledger: u64,
}

/// Where the listener pulls events from
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Fetch events strictly after `cursor`, or from `start_ledger` when no
    /// cursor is known yet. With neither, start from the chain head.
    async fn fetch(
        &self,
        cursor: Option<&EventCursor>,
        start_ledger: Option<u64>,
    ) -> Result<EventBatch>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEventsResult {
    #[serde(default)]
    events: Vec<ChainEvent>,
    #[serde(default)]
    latest_ledger: u64,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestLedgerResult {
    sequence: u64,
}

/// HTTP JSON-RPC event source
pub struct RpcEventSource {
    rpc_url: String,
    contract_ids: Vec<String>,
    page_limit: u32,
    client: Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcEventSource {
    /// Create a source polling `contract_ids` on the node at `rpc_url`
    pub fn new(
        rpc_url: impl Into<String>,
        contract_ids: Vec<String>,
        page_limit: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            rpc_url: rpc_url.into(),
            contract_ids,
            page_limit,
            client,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Current ledger sequence at the chain head
    pub async fn latest_ledger(&self) -> Result<u64> {
        let result: LatestLedgerResult = self.call("getLatestLedger", json!({})).await?;
        Ok(result.sequence)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SdkError::Timeout(self.timeout)
                } else {
                    SdkError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SdkError::Http {
                status,
                message: format!("RPC {} failed: {}", method, message),
            });
        }

        let rpc: RpcResponse<T> = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(SdkError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        rpc.result
            .ok_or_else(|| SdkError::InvalidResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl EventSource for RpcEventSource {
    async fn fetch(
        &self,
        cursor: Option<&EventCursor>,
        start_ledger: Option<u64>,
    ) -> Result<EventBatch> {
        let mut params = json!({
            "filters": [{ "type": "contract", "contractIds": self.contract_ids }],
            "pagination": { "limit": self.page_limit },
            "xdrFormat": "json",
        });

        match cursor {
            Some(cursor) => {
                params["pagination"]["cursor"] = json!(cursor.as_str());
            }
            None => {
                let start = match start_ledger {
                    Some(ledger) => ledger,
                    None => self.latest_ledger().await?,
                };
                params["startLedger"] = json!(start);
            }
        }

        let result: GetEventsResult = self.call("getEvents", params).await?;
        debug!(
            events = result.events.len(),
            latest_ledger = result.latest_ledger,
            "Fetched contract events"
        );

        Ok(EventBatch {
            events: result.events,
            cursor: result.cursor.filter(|c| !c.is_empty()).map(EventCursor::new),
            latest_ledger: result.latest_ledger,
        })
    }
}
