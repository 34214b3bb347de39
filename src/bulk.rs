//! Bulk operations over the current selection
//!
//! Each selected id is attempted independently; only the ids that succeeded
//! are applied to the store, in a single history commit once every attempt
//! has settled.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::SyncClient;
use crate::error::{Result, SdkError};
use crate::events::{EventBus, SdkEvent};
use crate::store::SubscriptionStore;
use crate::types::{Subscription, SubscriptionStatus};

/// Action applied to every selected subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Delete,
    Cancel,
    Pause,
    /// Read-only: produces CSV, no remote calls and no commit
    Export,
}

impl BulkAction {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, BulkAction::Export)
    }
}

/// Per-item remote effect of a bulk action
#[async_trait]
pub trait BulkEffect: Send + Sync {
    async fn apply(&self, action: BulkAction, subscription_id: &str) -> Result<()>;
}

#[async_trait]
impl BulkEffect for SyncClient {
    async fn apply(&self, action: BulkAction, subscription_id: &str) -> Result<()> {
        let result = match action {
            BulkAction::Delete => self.delete_subscription(subscription_id).await,
            BulkAction::Cancel => self.cancel_subscription(subscription_id).await,
            BulkAction::Pause => self.pause_subscription(subscription_id).await,
            BulkAction::Export => return Ok(()),
        };
        result.into_result().map(|_| ())
    }
}

/// Overall outcome by succeeded/failed counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Success,
    Partial,
    Failed,
}

/// A single id that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub subscription_id: String,
    pub error: String,
}

/// Aggregate result of a bulk action, in selection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    pub action: BulkAction,
    pub succeeded_ids: Vec<String>,
    pub failed: Vec<BulkFailure>,
    /// CSV document, set for `Export` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
}

impl BulkReport {
    pub fn status(&self) -> BulkStatus {
        if self.failed.is_empty() {
            BulkStatus::Success
        } else if self.succeeded_ids.is_empty() {
            BulkStatus::Failed
        } else {
            BulkStatus::Partial
        }
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.subscription_id.as_str()).collect()
    }
}

/// Runs one bulk action at a time against a shared store
pub struct BulkExecutor<E: BulkEffect> {
    effect: Arc<E>,
    bus: EventBus,
    busy: AtomicBool,
}

impl<E: BulkEffect> BulkExecutor<E> {
    pub fn new(effect: Arc<E>, bus: EventBus) -> Self {
        Self {
            effect,
            bus,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Apply `action` to every selected subscription
    ///
    /// Rejects with `BulkBusy` while another action is running and with
    /// `EmptySelection` when nothing is selected. The store lock is released
    /// while remote calls are in flight. The selection is cleared afterwards
    /// and the report is published on the `bulk` channel.
    pub async fn execute(
        &self,
        store: &Mutex<SubscriptionStore>,
        action: BulkAction,
    ) -> Result<BulkReport> {
        let _guard = BusyGuard::acquire(&self.busy)?;

        let selected: Vec<Subscription> = {
            let store = store.lock().await;
            if store.selected_ids().is_empty() {
                return Err(SdkError::EmptySelection);
            }
            store.selected().into_iter().cloned().collect()
        };

        let report = if action.is_mutation() {
            self.mutate(store, action, &selected).await
        } else {
            let ids = selected.iter().map(|s| s.id.clone()).collect();
            let report = BulkReport {
                action,
                succeeded_ids: ids,
                failed: Vec::new(),
                export: Some(export_csv(&selected)),
            };
            store.lock().await.clear_selection();
            report
        };

        info!(
            action = ?action,
            succeeded = report.succeeded_ids.len(),
            failed = report.failed.len(),
            "Bulk action finished"
        );
        self.bus.publish(SdkEvent::Bulk(report.clone()));
        Ok(report)
    }

    // === Private Implementation ===

    async fn mutate(
        &self,
        store: &Mutex<SubscriptionStore>,
        action: BulkAction,
        selected: &[Subscription],
    ) -> BulkReport {
        let attempts = selected
            .iter()
            .map(|s| self.effect.apply(action, s.id.as_str()));
        let outcomes = join_all(attempts).await;

        let mut succeeded_ids = Vec::new();
        let mut failed = Vec::new();
        for (subscription, outcome) in selected.iter().zip(outcomes) {
            match outcome {
                Ok(()) => succeeded_ids.push(subscription.id.clone()),
                Err(e) => {
                    warn!(subscription_id = %subscription.id, action = ?action, error = %e, "Bulk item failed");
                    failed.push(BulkFailure {
                        subscription_id: subscription.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut store = store.lock().await;
        match action {
            BulkAction::Delete => {
                store.remove_many(&succeeded_ids);
            }
            BulkAction::Cancel => {
                store.set_status_many(&succeeded_ids, SubscriptionStatus::Cancelled);
            }
            BulkAction::Pause => {
                store.set_status_many(&succeeded_ids, SubscriptionStatus::Paused);
            }
            BulkAction::Export => {}
        }
        store.clear_selection();

        BulkReport {
            action,
            succeeded_ids,
            failed,
            export: None,
        }
    }
}

/// Clears the busy flag when the action ends, including on early return
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SdkError::BulkBusy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ==================== CSV Export ====================

const EXPORT_HEADERS: [&str; 7] = [
    "Name",
    "Provider",
    "Category",
    "Price",
    "Billing Cycle",
    "Next Billing Date",
    "Status",
];

/// Render subscriptions as CSV, one quoted field per column
pub fn export_csv(subscriptions: &[Subscription]) -> String {
    let mut lines = Vec::with_capacity(subscriptions.len() + 1);
    lines.push(csv_row(EXPORT_HEADERS.iter().map(|h| h.to_string())));
    for s in subscriptions {
        lines.push(csv_row([
            s.name.clone(),
            s.provider.clone(),
            s.category.clone().unwrap_or_default(),
            format!("{:.2}", s.price),
            s.billing_cycle.to_string(),
            s.next_billing_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            s.status.to_string(),
        ]));
    }
    lines.join("\n")
}

fn csv_row(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|f| csv_field(&f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a field, doubling inner quotes; values a spreadsheet would run as
/// a formula get a leading apostrophe
fn csv_field(value: &str) -> String {
    let guarded = match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{}", value),
        _ => value.to_string(),
    };
    format!("\"{}\"", guarded.replace('"', "\"\""))
}
