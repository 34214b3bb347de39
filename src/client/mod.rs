//! Sync Client for the subscription REST API
//!
//! - `subscriptions`: CRUD calls with lifecycle events
//! - `gift_card`: gift card attachment with its own error path

mod gift_card;
mod subscriptions;

pub use gift_card::AttachGiftCardResult;
pub use subscriptions::{CredentialProvider, StaticToken, SyncClient};
