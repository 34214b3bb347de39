//! Syncro SDK - Subscription Sync Client
//!
//! Client-side engine for tracking recurring subscriptions against a REST
//! backend that mirrors state on-chain.
//!
//! # Architecture
//!
//! - **Sync Client**: validated CRUD calls with idempotency/version headers;
//!   every outcome becomes a result object plus a lifecycle event
//! - **Event Stream Listener**: background task polling on-chain renewal and
//!   approval events through JSON-RPC, resuming from a persisted cursor
//! - **Local State Store**: in-memory collection with undo/redo history and
//!   multi-select
//! - **Bulk Executor**: per-item delete/cancel/pause/export over the selection,
//!   committing only what succeeded
//!
//! All of them publish on one [`EventBus`].
//!
//! # Example
//!
//! ```rust,no_run
//! use syncro_sdk::{ListenerConfig, MutationOptions, SdkConfig, SubscriptionCreateInput, SyncClient};
//!
//! # async fn example() -> syncro_sdk::Result<()> {
//! let client = SyncClient::new(SdkConfig::from_env())?;
//! let mut renewals = client.events().subscribe_renewal_attempt();
//! let listener = client.listen_to_events(ListenerConfig::from_env())?;
//!
//! let created = client
//!     .create_subscription(
//!         &SubscriptionCreateInput::new("Spotify", 9.99, "monthly"),
//!         MutationOptions::default(),
//!     )
//!     .await;
//! if !created.success {
//!     eprintln!("create failed: {:?}", created.error);
//! }
//!
//! if let Ok(attempt) = renewals.recv().await {
//!     println!("renewal for {} succeeded: {}", attempt.subscription_id, attempt.success);
//! }
//! listener.stop().await;
//! # Ok(())
//! # }
//! ```

// Bulk actions over the selection
pub mod bulk;

// REST client and gift card attachment
pub mod client;

// Configuration
pub mod config;

// Error types
pub mod error;

// Event bus and on-chain listener
pub mod events;

// Local store with history
pub mod store;

// Wire and domain types
pub mod types;

// Input validation
pub mod validation;

// Re-export client types
pub use client::{AttachGiftCardResult, CredentialProvider, StaticToken, SyncClient};
pub use config::{SdkConfig, DEFAULT_OPERATION_TIMEOUT};

// Re-export event types
pub use events::{
    ApprovalGranted, EventBus, EventCursor, EventListener, ListenerConfig, ListenerHandle,
    ListenerState, LifecycleEvent, LifecycleEventType, RenewalAttempt, RenewalFailed, SdkEvent,
};

// Re-export store and bulk types
pub use bulk::{BulkAction, BulkEffect, BulkExecutor, BulkReport, BulkStatus};
pub use store::{History, Plan, SubscriptionStore};

// Re-export domain types
pub use types::{
    BillingCycle, BlockchainSync, GiftCardAttachment, MutationOptions, Subscription,
    SubscriptionCreateInput, SubscriptionResult, SubscriptionSource, SubscriptionStatus,
    SubscriptionUpdateInput, Tags,
};
pub use validation::{validate_create, validate_gift_card_hash, validate_update, ValidationResult};

// Re-export error types
pub use error::{FailureKind, Result, SdkError};
