//! Types for the subscription API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{FailureKind, SdkError};

/// Billing period of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    Quarterly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Quarterly => "quarterly",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Paused,
    Trial,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Trial => "trial",
        }
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "paused" => Ok(SubscriptionStatus::Paused),
            "trial" => Ok(SubscriptionStatus::Trial),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a subscription record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionSource {
    Manual,
    GiftCard,
}

impl SubscriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionSource::Manual => "manual",
            SubscriptionSource::GiftCard => "gift_card",
        }
    }
}

impl Default for SubscriptionSource {
    fn default() -> Self {
        Self::Manual
    }
}

impl FromStr for SubscriptionSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SubscriptionSource::Manual),
            "gift_card" => Ok(SubscriptionSource::GiftCard),
            _ => Err(()),
        }
    }
}

/// Ordered tag set
///
/// Insertion order is kept for display, duplicates collapse, and equality
/// ignores order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag, returning false if it was already present
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        self.0.len() != before
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        let mut set = Tags::new();
        for tag in tags {
            set.insert(tag);
        }
        set
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Tags::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().collect::<HashSet<_>>() == other.0.iter().collect::<HashSet<_>>()
    }
}

impl Eq for Tags {}

/// A tracked subscription as stored by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    pub price: f64,
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub next_billing_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub renewal_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub source: SubscriptionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Server fields this client does not model, kept for round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Input for creating a subscription
///
/// Enum-valued fields are raw strings because they usually come straight
/// from form input; `validate_create` checks them before anything is sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionCreateInput {
    pub name: String,
    pub price: f64,
    pub billing_cycle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_billing_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SubscriptionCreateInput {
    pub fn new(name: impl Into<String>, price: f64, billing_cycle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price,
            billing_cycle: billing_cycle.into(),
            ..Default::default()
        }
    }
}

/// Request body sent on create, with server defaults filled in
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreatePayload<'a> {
    pub name: &'a str,
    pub price: f64,
    pub billing_cycle: &'a str,
    pub provider: &'a str,
    pub status: &'a str,
    pub next_billing_date: Option<NaiveDate>,
    pub category: Option<&'a str>,
    pub logo_url: Option<&'a str>,
    pub website_url: Option<&'a str>,
    pub renewal_url: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub tags: &'a [String],
    pub email_account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'a str>,
}

impl<'a> From<&'a SubscriptionCreateInput> for CreatePayload<'a> {
    fn from(input: &'a SubscriptionCreateInput) -> Self {
        Self {
            name: &input.name,
            price: input.price,
            billing_cycle: &input.billing_cycle,
            provider: input.provider.as_deref().unwrap_or(&input.name),
            status: input
                .status
                .as_deref()
                .unwrap_or(SubscriptionStatus::Active.as_str()),
            next_billing_date: input.next_billing_date,
            category: input.category.as_deref(),
            logo_url: input.logo_url.as_deref(),
            website_url: input.website_url.as_deref(),
            renewal_url: input.renewal_url.as_deref(),
            notes: input.notes.as_deref(),
            tags: input.tags.as_deref().unwrap_or(&[]),
            email_account_id: input.email_account_id.as_deref(),
            source: input.source.as_deref(),
        }
    }
}

/// Partial update input
///
/// Outer `None` leaves a field untouched; `Some(None)` on a nullable field
/// clears it on the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionUpdateInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_billing_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl SubscriptionUpdateInput {
    /// Update that only changes the status
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status.as_str().to_string()),
            ..Default::default()
        }
    }
}

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
    /// Passed through unchanged as `Idempotency-Key`; never generated
    pub idempotency_key: Option<String>,
    /// Expected record version, sent as `If-Match` (update only)
    pub if_match: Option<u64>,
}

impl MutationOptions {
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_if_match(mut self, version: u64) -> Self {
        self.if_match = Some(version);
        self
    }
}

/// Secondary on-chain mirror outcome of a mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainSync {
    #[serde(default)]
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body shape shared by every endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub blockchain: Option<BlockchainSync>,
}

impl<T> Default for ApiEnvelope<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            blockchain: None,
        }
    }
}

/// Normalized outcome of a Sync Client call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionResult<T = Subscription> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainSync>,
    /// Failure class, set whenever `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl<T> SubscriptionResult<T> {
    pub fn ok(data: Option<T>, blockchain: Option<BlockchainSync>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            blockchain,
            failure: None,
        }
    }

    pub fn failed(err: &SdkError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            blockchain: None,
            failure: Some(err.kind()),
        }
    }

    /// Non-fatal warning when the mutation landed but the chain mirror did not
    pub fn blockchain_warning(&self) -> Option<&str> {
        match &self.blockchain {
            Some(chain) if self.success && !chain.synced => {
                Some(chain.error.as_deref().unwrap_or("Blockchain sync failed"))
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    /// Convert back into a `Result` for callers that compose with `?`
    pub fn into_result(self) -> Result<Option<T>, SdkError> {
        if self.success {
            return Ok(self.data);
        }
        Err(SdkError::Reported {
            kind: self.failure.unwrap_or(FailureKind::Transport),
            message: self.error.unwrap_or_default(),
        })
    }
}

/// Gift card bound to a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardAttachment {
    pub id: String,
    pub subscription_id: String,
    pub gift_card_hash: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttachGiftCardRequest<'a> {
    pub gift_card_hash: &'a str,
    pub provider: &'a str,
}
