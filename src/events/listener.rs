//! On-chain event stream listener
//!
//! Polls an [`EventSource`] on a fixed interval, classifies contract events
//! into renewal/approval events and publishes them on the [`EventBus`].
//!
//! # Delivery
//!
//! The cursor advances past each processed event and is handed to the
//! [`CursorSink`] after every batch, before the next poll. A crash between
//! publishing and persisting redelivers those events on restart, so consumers
//! should treat handling as idempotent by `event_id`.
//!
//! # Errors
//!
//! Fetch failures never stop the loop: an `EventError` is published, the
//! listener backs off for one poll interval and polls again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::rpc::{ChainEvent, EventBatch, EventSource, RpcEventSource};
use super::{
    ApprovalGranted, ChainPosition, EventBus, EventError, RenewalAttempt, RenewalFailed, SdkEvent,
};
use crate::error::{Result, SdkError};

/// Opaque position in the event stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCursor(String);

impl EventCursor {
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persists the cursor between runs
#[async_trait]
pub trait CursorSink: Send + Sync {
    async fn save(&self, cursor: &EventCursor) -> Result<()>;
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,
    /// Contracts whose events are followed
    pub contract_ids: Vec<String>,
    /// Delay between polls, and the backoff after an error
    pub poll_interval: Duration,
    /// Resume position from a previous run
    pub cursor: Option<EventCursor>,
    /// First ledger to scan when no cursor is known (default: chain head)
    pub start_ledger: Option<u64>,
    /// Maximum events per poll
    pub page_limit: u32,
    /// Timeout for a single RPC request
    pub request_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8000/soroban/rpc".to_string(),
            contract_ids: Vec::new(),
            poll_interval: Duration::from_secs(5),
            cursor: None,
            start_ledger: None,
            page_limit: 100,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ListenerConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: std::env::var("SYNCRO_RPC_URL").unwrap_or_else(|_| defaults.rpc_url.clone()),
            contract_ids: std::env::var("SYNCRO_CONTRACT_IDS")
                .map(|ids| {
                    ids.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            poll_interval: std::env::var("SYNCRO_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            cursor: None,
            start_ledger: std::env::var("SYNCRO_START_LEDGER")
                .ok()
                .and_then(|s| s.parse().ok()),
            ..defaults
        }
    }

    pub fn with_cursor(mut self, cursor: EventCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Polling,
    /// Waiting one interval after a failed poll
    Backoff,
    Stopped,
}

/// Event stream listener, not yet running
pub struct EventListener<S: EventSource = RpcEventSource> {
    config: ListenerConfig,
    source: Arc<S>,
    bus: EventBus,
    sink: Option<Arc<dyn CursorSink>>,
}

impl EventListener<RpcEventSource> {
    /// Listener over the JSON-RPC node named in `config`
    pub fn new(config: ListenerConfig, bus: EventBus) -> Result<Self> {
        if config.contract_ids.is_empty() {
            return Err(SdkError::Validation(
                "At least one contract id is required".into(),
            ));
        }
        let source = RpcEventSource::new(
            config.rpc_url.clone(),
            config.contract_ids.clone(),
            config.page_limit,
            config.request_timeout,
        )?;
        Ok(Self::with_source(config, source, bus))
    }
}

impl<S: EventSource> EventListener<S> {
    /// Listener over a custom event source
    pub fn with_source(config: ListenerConfig, source: S, bus: EventBus) -> Self {
        Self {
            config,
            source: Arc::new(source),
            bus,
            sink: None,
        }
    }

    /// Persist the cursor through `sink` after each batch
    pub fn with_cursor_sink(mut self, sink: Arc<dyn CursorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Spawn the poll loop on the current tokio runtime
    pub fn start(self) -> ListenerHandle {
        let stopped = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ListenerState::Idle);

        let poller = Poller {
            cursor: self.config.cursor.clone(),
            start_ledger: self.config.start_ledger,
            poll_interval: self.config.poll_interval,
            source: self.source,
            bus: self.bus,
            sink: self.sink,
            stopped: Arc::clone(&stopped),
            shutdown_rx,
            state_tx,
        };

        info!(
            contracts = ?self.config.contract_ids,
            interval = ?self.config.poll_interval,
            "Starting event listener"
        );
        let task = tokio::spawn(poller.run());

        ListenerHandle {
            stopped,
            shutdown_tx,
            state_rx,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Control handle for a running listener
///
/// Dropping the handle also ends the loop.
pub struct ListenerHandle {
    stopped: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ListenerState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    /// Stop the listener
    ///
    /// Resolves once the poll task has exited; nothing is published after
    /// that. Safe to call repeatedly and from any state.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Event listener task ended abnormally");
            }
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state_rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ListenerState> {
        self.state_rx.clone()
    }
}

struct Poller<S: EventSource> {
    cursor: Option<EventCursor>,
    start_ledger: Option<u64>,
    poll_interval: Duration,
    source: Arc<S>,
    bus: EventBus,
    sink: Option<Arc<dyn CursorSink>>,
    stopped: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ListenerState>,
}

impl<S: EventSource> Poller<S> {
    async fn run(mut self) {
        loop {
            if self.is_stopped() {
                break;
            }
            self.set_state(ListenerState::Polling);

            let start_ledger = if self.cursor.is_none() { self.start_ledger } else { None };
            let fetched = tokio::select! {
                res = self.source.fetch(self.cursor.as_ref(), start_ledger) => Some(res),
                _ = self.shutdown_rx.changed() => None,
            };
            let Some(fetched) = fetched else {
                break;
            };

            match fetched {
                Ok(batch) => self.process_batch(batch).await,
                Err(e) => {
                    if self.is_stopped() {
                        break;
                    }
                    warn!(error = %e, "Event poll failed, retrying after {:?}", self.poll_interval);
                    self.emit(SdkEvent::EventError(EventError {
                        message: e.to_string(),
                        event_id: None,
                    }));
                    self.set_state(ListenerState::Backoff);
                }
            }

            if self.is_stopped() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.set_state(ListenerState::Stopped);
        info!("Event listener stopped");
    }

    async fn process_batch(&mut self, batch: EventBatch) {
        let before = self.cursor.clone();
        let mut completed = true;

        for event in &batch.events {
            if self.is_stopped() {
                completed = false;
                break;
            }
            if self.cursor.as_ref().map(EventCursor::as_str) == Some(event.id.as_str()) {
                debug!(event_id = %event.id, "Skipping already processed event");
                continue;
            }

            match classify(event) {
                Ok(Some(events)) => self.emit_all(events),
                Ok(None) => {
                    debug!(event_id = %event.id, topic = ?event.topic, "Ignoring unrecognized event");
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Malformed contract event");
                    self.emit(SdkEvent::EventError(EventError {
                        message: e.to_string(),
                        event_id: Some(event.id.clone()),
                    }));
                }
            }
            self.cursor = Some(EventCursor::new(event.id.clone()));
        }

        if completed {
            if let Some(cursor) = batch.cursor {
                self.cursor = Some(cursor);
            } else if self.cursor.is_none() && batch.latest_ledger > 0 {
                self.start_ledger = Some(batch.latest_ledger);
            }
        }

        if self.cursor != before {
            self.persist_cursor().await;
        }
    }

    async fn persist_cursor(&self) {
        let (Some(sink), Some(cursor)) = (&self.sink, &self.cursor) else {
            return;
        };
        if let Err(e) = sink.save(cursor).await {
            error!(cursor = %cursor, error = %e, "Failed to persist event cursor");
            self.emit(SdkEvent::EventError(EventError {
                message: format!("Failed to persist cursor: {}", e),
                event_id: None,
            }));
        }
    }

    /// Publish unless the listener has been stopped
    fn emit(&self, event: SdkEvent) {
        if self.is_stopped() {
            return;
        }
        self.bus.publish(event);
    }

    /// Publish every event classified from one chain event, or none of them
    fn emit_all(&self, events: Vec<SdkEvent>) {
        if self.is_stopped() {
            return;
        }
        for event in events {
            self.bus.publish(event);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ListenerState) {
        self.state_tx.send_replace(state);
    }
}

enum EventKind {
    RenewalAttempt { implied_success: Option<bool> },
    ApprovalGranted,
    RenewalFailed,
}

fn event_kind(symbol: &str) -> Option<EventKind> {
    let normalized: String = symbol
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();

    match normalized.as_str() {
        "renewalattempt" | "renewalattempted" | "renewal" => {
            Some(EventKind::RenewalAttempt { implied_success: None })
        }
        "renewalsuccess" | "renewed" => Some(EventKind::RenewalAttempt {
            implied_success: Some(true),
        }),
        "approvalgranted" | "approval" | "approved" => Some(EventKind::ApprovalGranted),
        "renewalfailed" | "renewalfailure" => Some(EventKind::RenewalFailed),
        _ => None,
    }
}

/// Classify a contract event into the events it publishes
///
/// Returns `Ok(None)` for events this SDK does not follow. A failed renewal
/// expands to a synthetic `RenewalAttempt { success: false }` followed by the
/// `RenewalFailed` itself, so attempt trackers see every attempt.
pub fn classify(event: &ChainEvent) -> Result<Option<Vec<SdkEvent>>> {
    let Some(kind) = event.topic.first().and_then(scalar_string).and_then(|s| event_kind(&s))
    else {
        return Ok(None);
    };

    let payload = as_object(&event.value);
    let subscription_id = field_string(&payload, &["subscription_id", "subscriptionId", "sub_id"])
        .or_else(|| event.topic.get(1).and_then(scalar_string))
        .ok_or_else(|| {
            SdkError::InvalidResponse(format!("event {} has no subscription id", event.id))
        })?;

    let position = ChainPosition {
        event_id: event.id.clone(),
        contract_id: event.contract_id.clone(),
        ledger: event.ledger,
        ledger_closed_at: event.ledger_closed_at.clone(),
        transaction_hash: event.tx_hash.clone(),
    };
    let amount = field_string(&payload, &["amount"]);

    let events = match kind {
        EventKind::RenewalAttempt { implied_success } => {
            let success = payload
                .get("success")
                .and_then(|v| scalar(v).as_bool())
                .or(implied_success)
                .ok_or_else(|| {
                    SdkError::InvalidResponse(format!("event {} has no success flag", event.id))
                })?;
            vec![SdkEvent::RenewalAttempt(RenewalAttempt {
                subscription_id,
                success,
                amount,
                position,
            })]
        }
        EventKind::ApprovalGranted => vec![SdkEvent::ApprovalGranted(ApprovalGranted {
            subscription_id,
            amount,
            spender: field_string(&payload, &["spender", "approved_by"]),
            expires_at_ledger: payload
                .get("expires_at_ledger")
                .or_else(|| payload.get("expiration_ledger"))
                .and_then(|v| scalar_u64(&scalar(v))),
            position,
        })],
        EventKind::RenewalFailed => {
            let failed = RenewalFailed {
                subscription_id,
                reason: field_string(&payload, &["reason", "error"]),
                amount,
                position,
            };
            vec![
                SdkEvent::RenewalAttempt(failed.as_attempt()),
                SdkEvent::RenewalFailed(failed),
            ]
        }
    };

    Ok(Some(events))
}

/// Unwrap a JSON-encoded contract value (`{"string": "x"}`, `{"u64": 5}`,
/// `{"map": [...]}`) into plain JSON
fn scalar(value: &Value) -> Value {
    let Value::Object(obj) = value else {
        return value.clone();
    };
    if obj.len() != 1 {
        return value.clone();
    }
    let Some((tag, inner)) = obj.iter().next() else {
        return value.clone();
    };
    match tag.as_str() {
        "string" | "symbol" | "address" | "bool" | "u32" | "i32" | "u64" | "i64" | "u128"
        | "i128" | "bytes" => inner.clone(),
        "map" => Value::Object(as_object(value)),
        _ => value.clone(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match scalar(value) {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Normalize an event payload into a JSON object
fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(obj) => match obj.get("map") {
            Some(Value::Array(entries)) if obj.len() == 1 => entries
                .iter()
                .filter_map(|entry| {
                    let key = entry.get("key").and_then(scalar_string)?;
                    let val = entry.get("val").map(scalar)?;
                    Some((key, val))
                })
                .collect(),
            _ => obj.clone(),
        },
        _ => Map::new(),
    }
}

fn field_string(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key))
        .and_then(scalar_string)
}
