//! Typed event bus
//!
//! One broadcast channel per event kind plus a combined channel that sees
//! every event in publish order.

use tokio::sync::broadcast;
use tracing::trace;

use super::{
    ApprovalGranted, EventError, GiftCardEvent, LifecycleEvent, RenewalAttempt, RenewalFailed,
    SdkEvent,
};
use crate::bulk::BulkReport;

const DEFAULT_CAPACITY: usize = 1000;

/// Publish side of the SDK events
///
/// Cloning is cheap; clones publish into the same channels.
#[derive(Debug, Clone)]
pub struct EventBus {
    subscription: broadcast::Sender<LifecycleEvent>,
    gift_card: broadcast::Sender<GiftCardEvent>,
    renewal_attempt: broadcast::Sender<RenewalAttempt>,
    approval_granted: broadcast::Sender<ApprovalGranted>,
    renewal_failed: broadcast::Sender<RenewalFailed>,
    event_error: broadcast::Sender<EventError>,
    bulk: broadcast::Sender<BulkReport>,
    all: broadcast::Sender<SdkEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose channels buffer `capacity` events per receiver
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscription: broadcast::channel(capacity).0,
            gift_card: broadcast::channel(capacity).0,
            renewal_attempt: broadcast::channel(capacity).0,
            approval_granted: broadcast::channel(capacity).0,
            renewal_failed: broadcast::channel(capacity).0,
            event_error: broadcast::channel(capacity).0,
            bulk: broadcast::channel(capacity).0,
            all: broadcast::channel(capacity).0,
        }
    }

    /// Publish an event to its channel and to the combined channel
    ///
    /// Events with no listeners are dropped.
    pub fn publish(&self, event: SdkEvent) {
        let delivered = match &event {
            SdkEvent::Subscription(e) => self.subscription.send(e.clone()).is_ok(),
            SdkEvent::GiftCard(e) => self.gift_card.send(e.clone()).is_ok(),
            SdkEvent::RenewalAttempt(e) => self.renewal_attempt.send(e.clone()).is_ok(),
            SdkEvent::ApprovalGranted(e) => self.approval_granted.send(e.clone()).is_ok(),
            SdkEvent::RenewalFailed(e) => self.renewal_failed.send(e.clone()).is_ok(),
            SdkEvent::EventError(e) => self.event_error.send(e.clone()).is_ok(),
            SdkEvent::Bulk(e) => self.bulk.send(e.clone()).is_ok(),
        };
        if !delivered {
            trace!("No channel listener for {:?}", event);
        }
        let _ = self.all.send(event);
    }

    pub fn subscribe_subscription(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.subscription.subscribe()
    }

    pub fn subscribe_gift_card(&self) -> broadcast::Receiver<GiftCardEvent> {
        self.gift_card.subscribe()
    }

    pub fn subscribe_renewal_attempt(&self) -> broadcast::Receiver<RenewalAttempt> {
        self.renewal_attempt.subscribe()
    }

    pub fn subscribe_approval_granted(&self) -> broadcast::Receiver<ApprovalGranted> {
        self.approval_granted.subscribe()
    }

    pub fn subscribe_renewal_failed(&self) -> broadcast::Receiver<RenewalFailed> {
        self.renewal_failed.subscribe()
    }

    pub fn subscribe_event_error(&self) -> broadcast::Receiver<EventError> {
        self.event_error.subscribe()
    }

    pub fn subscribe_bulk(&self) -> broadcast::Receiver<BulkReport> {
        self.bulk.subscribe()
    }

    /// Receive every event, in publish order across channels
    pub fn subscribe_all(&self) -> broadcast::Receiver<SdkEvent> {
        self.all.subscribe()
    }
}
