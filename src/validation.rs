//! Client-side payload validation
//!
//! Pure checks run before any network call. A failed validation must never
//! reach the network.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::types::{
    BillingCycle, SubscriptionCreateInput, SubscriptionSource, SubscriptionStatus,
    SubscriptionUpdateInput,
};

/// Maximum trimmed length of a subscription name
pub const MAX_NAME_LEN: usize = 100;

/// Maximum accepted price
pub const MAX_PRICE: f64 = 100_000.0;

static GIFT_CARD_HASH: OnceLock<Option<Regex>> = OnceLock::new();

fn gift_card_hash_regex() -> Option<&'static Regex> {
    GIFT_CARD_HASH
        .get_or_init(|| Regex::new(r"^[a-fA-F0-9]{32,64}$").ok())
        .as_ref()
}

/// Validated field names, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Name,
    Price,
    BillingCycle,
    Status,
    Source,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Price => "price",
            Field::BillingCycle => "billing_cycle",
            Field::Status => "status",
            Field::Source => "source",
        }
    }
}

/// Outcome of validating an input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Field to message, ordered by field declaration order
    pub errors: BTreeMap<Field, String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error in field order, the one shown to the user
    pub fn first_error(&self) -> Option<&str> {
        self.errors.values().next().map(String::as_str)
    }

    pub fn error_for(&self, field: Field) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    fn push(&mut self, field: Field, message: &str) {
        self.errors.entry(field).or_insert_with(|| message.to_string());
    }
}

/// Validate a create payload
pub fn validate_create(input: &SubscriptionCreateInput) -> ValidationResult {
    let mut result = ValidationResult::default();

    if input.name.trim().is_empty() {
        result.push(Field::Name, "Subscription name is required");
    } else {
        check_name_length(&input.name, &mut result);
    }

    check_price(input.price, &mut result);
    check_billing_cycle(&input.billing_cycle, &mut result);

    if let Some(status) = &input.status {
        check_status(status, &mut result);
    }

    if let Some(source) = &input.source {
        if source.parse::<SubscriptionSource>().is_err() {
            result.push(Field::Source, "source must be 'manual' or 'gift_card'");
        }
    }

    result
}

/// Validate a partial update; only fields that are present are checked
pub fn validate_update(input: &SubscriptionUpdateInput) -> ValidationResult {
    let mut result = ValidationResult::default();

    if let Some(name) = &input.name {
        if name.trim().is_empty() {
            result.push(Field::Name, "Subscription name cannot be empty");
        } else {
            check_name_length(name, &mut result);
        }
    }

    if let Some(price) = input.price {
        check_price(price, &mut result);
    }

    if let Some(cycle) = &input.billing_cycle {
        check_billing_cycle(cycle, &mut result);
    }

    if let Some(status) = &input.status {
        check_status(status, &mut result);
    }

    result
}

/// Check a gift card hash: 32 to 64 hex characters
pub fn validate_gift_card_hash(hash: &str) -> bool {
    (32..=64).contains(&hash.len())
        && gift_card_hash_regex().is_some_and(|re| re.is_match(hash))
}

fn check_name_length(name: &str, result: &mut ValidationResult) {
    if name.trim().chars().count() > MAX_NAME_LEN {
        result.push(Field::Name, "Subscription name must be less than 100 characters");
    }
}

fn check_price(price: f64, result: &mut ValidationResult) {
    if !price.is_finite() || price < 0.0 {
        result.push(Field::Price, "Price must be 0 or greater");
    } else if price > MAX_PRICE {
        result.push(Field::Price, "Price must be less than $100,000");
    }
}

fn check_billing_cycle(cycle: &str, result: &mut ValidationResult) {
    if cycle.parse::<BillingCycle>().is_err() {
        result.push(
            Field::BillingCycle,
            "billing_cycle must be monthly, yearly, or quarterly",
        );
    }
}

fn check_status(status: &str, result: &mut ValidationResult) {
    if status.parse::<SubscriptionStatus>().is_err() {
        result.push(
            Field::Status,
            "status must be active, cancelled, paused, or trial",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> SubscriptionCreateInput {
        SubscriptionCreateInput::new("Netflix", 15.99, "monthly")
    }

    #[test]
    fn test_valid_create_input() {
        let result = validate_create(&valid_input());
        assert!(result.is_valid());
        assert!(result.errors.is_empty());
        assert_eq!(result.first_error(), None);
    }

    #[test]
    fn test_boundary_prices_accepted() {
        for price in [0.0, MAX_PRICE] {
            let mut input = valid_input();
            input.price = price;
            assert!(validate_create(&input).is_valid(), "price {price}");
        }
    }

    #[test]
    fn test_each_invalid_field_is_keyed() {
        let cases: Vec<(Field, Box<dyn Fn(&mut SubscriptionCreateInput)>)> = vec![
            (Field::Name, Box::new(|i| i.name = "   ".into())),
            (Field::Name, Box::new(|i| i.name = "x".repeat(101))),
            (Field::Price, Box::new(|i| i.price = -1.0)),
            (Field::Price, Box::new(|i| i.price = f64::NAN)),
            (Field::Price, Box::new(|i| i.price = 100_000.01)),
            (Field::BillingCycle, Box::new(|i| i.billing_cycle = "weekly".into())),
            (Field::BillingCycle, Box::new(|i| i.billing_cycle = String::new())),
            (Field::Status, Box::new(|i| i.status = Some("expired".into()))),
            (Field::Source, Box::new(|i| i.source = Some("import".into()))),
        ];

        for (field, mutate) in cases {
            let mut input = valid_input();
            mutate(&mut input);
            let result = validate_create(&input);
            assert!(!result.is_valid());
            assert!(result.error_for(field).is_some(), "expected error for {:?}", field);
            assert_eq!(result.errors.len(), 1);
        }
    }

    #[test]
    fn test_name_length_counts_trimmed_chars() {
        let mut input = valid_input();
        input.name = format!("  {}  ", "a".repeat(100));
        assert!(validate_create(&input).is_valid());
    }

    #[test]
    fn test_first_error_follows_field_order() {
        let input = SubscriptionCreateInput {
            name: String::new(),
            price: -5.0,
            billing_cycle: "daily".into(),
            source: Some("bogus".into()),
            ..Default::default()
        };

        let result = validate_create(&input);
        let fields: Vec<_> = result.errors.keys().copied().collect();
        assert_eq!(
            fields,
            vec![Field::Name, Field::Price, Field::BillingCycle, Field::Source]
        );
        assert_eq!(result.first_error(), Some("Subscription name is required"));
    }

    #[test]
    fn test_update_checks_only_present_fields() {
        assert!(validate_update(&SubscriptionUpdateInput::default()).is_valid());

        let result = validate_update(&SubscriptionUpdateInput {
            name: Some(" ".into()),
            status: Some("gone".into()),
            ..Default::default()
        });
        assert_eq!(result.error_for(Field::Name), Some("Subscription name cannot be empty"));
        assert!(result.error_for(Field::Status).is_some());
        assert!(result.error_for(Field::Price).is_none());
    }

    #[test]
    fn test_update_accepts_every_status() {
        for status in ["active", "cancelled", "paused", "trial"] {
            let input = SubscriptionUpdateInput {
                status: Some(status.into()),
                ..Default::default()
            };
            assert!(validate_update(&input).is_valid());
        }
    }

    #[test]
    fn test_gift_card_hash() {
        assert!(validate_gift_card_hash(&"a1".repeat(16)));
        assert!(validate_gift_card_hash(&"F".repeat(64)));
        assert!(!validate_gift_card_hash(&format!("zz11{}", "a".repeat(30))));
        assert!(!validate_gift_card_hash(&"a".repeat(31)));
        assert!(!validate_gift_card_hash(&"a".repeat(65)));
        assert!(!validate_gift_card_hash(""));
    }

    #[test]
    fn test_gift_card_hash_pattern_compiles() {
        assert!(gift_card_hash_regex().is_some());
        assert!(!validate_gift_card_hash(&format!("{}g", "a".repeat(40))));
    }
}
