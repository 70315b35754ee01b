//! Payment purpose decoded from charge or payment metadata.
//!
//! Checkout attaches a free-form metadata object describing what a payment is
//! for. The provider lower-snake-cases metadata keys on the way back, so every
//! key is looked up in both spellings.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::foundation::{CustomerId, SubscriptionId, UserId};

use super::BillingTerm;

const TYPE_PLATFORM: &str = "platform_subscription";
const TYPE_REACTIVATION: &str = "subscription_reactivation";
const PLATFORM_HINTS: [&str; 5] = [
    "months",
    "billing_frequency",
    "billingFrequency",
    "plan_id",
    "planId",
];

/// What an approved payment pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// The merchant paying the operator.
    PlatformSubscription {
        user_id: UserId,
        plan_id: Option<String>,
        plan_name: Option<String>,
        term: BillingTerm,
    },

    /// A merchant's customer paying for a merchant plan.
    ClientSubscription {
        subscription_id: SubscriptionId,
        customer_id: Option<CustomerId>,
        user_id: UserId,
        /// Explicit term from metadata; the subscription's own term otherwise.
        term: Option<BillingTerm>,
        reactivation: bool,
    },

    /// A one-off order. Recognised and acknowledged only.
    Order {
        order_id: String,
        order_number: Option<String>,
    },

    Unknown,
}

impl PaymentPurpose {
    /// Decodes a metadata object. Anything unrecognised becomes [`PaymentPurpose::Unknown`].
    pub fn from_metadata(metadata: &Value) -> Self {
        let Some(map) = metadata.as_object() else {
            return PaymentPurpose::Unknown;
        };

        let kind = string_field(map, &["type"]);

        if kind.as_deref() == Some(TYPE_PLATFORM) {
            return platform(map);
        }

        if kind.as_deref() == Some(TYPE_REACTIVATION)
            || string_field(map, &["subscription_id", "subscriptionId"]).is_some()
        {
            return client(map, kind.as_deref() == Some(TYPE_REACTIVATION));
        }

        if let Some(order_id) = string_field(map, &["order_id", "orderId"]) {
            return PaymentPurpose::Order {
                order_id,
                order_number: string_field(map, &["order_number", "orderNumber"]),
            };
        }

        let has_platform_hints = PLATFORM_HINTS.iter().any(|k| map.contains_key(*k));
        if has_platform_hints && string_field(map, &["user_id", "userId"]).is_some() {
            return platform(map);
        }

        PaymentPurpose::Unknown
    }

    /// The merchant account the payment belongs to.
    pub fn owner(&self) -> Option<&UserId> {
        match self {
            PaymentPurpose::PlatformSubscription { user_id, .. }
            | PaymentPurpose::ClientSubscription { user_id, .. } => Some(user_id),
            PaymentPurpose::Order { .. } | PaymentPurpose::Unknown => None,
        }
    }

    /// True for purposes that mutate a subscription.
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            PaymentPurpose::PlatformSubscription { .. } | PaymentPurpose::ClientSubscription { .. }
        )
    }

    pub fn is_order(&self) -> bool {
        matches!(self, PaymentPurpose::Order { .. })
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentPurpose::PlatformSubscription { .. } => "platform_subscription",
            PaymentPurpose::ClientSubscription {
                reactivation: true, ..
            } => "client_reactivation",
            PaymentPurpose::ClientSubscription { .. } => "client_subscription",
            PaymentPurpose::Order { .. } => "order",
            PaymentPurpose::Unknown => "unknown",
        }
    }
}

fn platform(map: &Map<String, Value>) -> PaymentPurpose {
    let Some(user_id) = user_id(map) else {
        tracing::warn!("Platform subscription metadata without user id");
        return PaymentPurpose::Unknown;
    };

    let term = term(map).unwrap_or_else(|| {
        tracing::warn!(
            user_id = %user_id,
            "Platform payment metadata without term, assuming monthly"
        );
        BillingTerm::Monthly
    });

    PaymentPurpose::PlatformSubscription {
        user_id,
        plan_id: string_field(map, &["plan_id", "planId"]),
        plan_name: string_field(map, &["plan_name", "planName"]),
        term,
    }
}

fn client(map: &Map<String, Value>, reactivation: bool) -> PaymentPurpose {
    let raw_id = string_field(map, &["subscription_id", "subscriptionId"]);
    let Some(subscription_id) = raw_id.as_deref().and_then(|s| s.parse::<SubscriptionId>().ok())
    else {
        tracing::warn!(
            subscription_id = ?raw_id,
            "Client subscription metadata with missing or invalid subscription id"
        );
        return PaymentPurpose::Unknown;
    };

    let Some(user_id) = user_id(map) else {
        tracing::warn!(%subscription_id, "Client subscription metadata without user id");
        return PaymentPurpose::Unknown;
    };

    PaymentPurpose::ClientSubscription {
        subscription_id,
        customer_id: string_field(map, &["customer_id", "customerId"])
            .and_then(|s| s.parse::<CustomerId>().ok()),
        user_id,
        term: term(map),
        reactivation,
    }
}

fn user_id(map: &Map<String, Value>) -> Option<UserId> {
    string_field(map, &["user_id", "userId"]).and_then(|s| UserId::new(s).ok())
}

/// `months` wins over `billing_frequency`.
fn term(map: &Map<String, Value>) -> Option<BillingTerm> {
    if let Some(months) = int_field(map, &["months"]) {
        return Some(BillingTerm::normalize(months));
    }
    string_field(map, &["billing_frequency", "billingFrequency"])
        .and_then(|label| BillingTerm::from_label(&label))
}

fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match field(map, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_field(map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    match field(map, keys)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SUB: &str = "550e8400-e29b-41d4-a716-446655440000";
    const CUSTOMER: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    #[test]
    fn decodes_camel_case_platform_metadata() {
        let purpose = PaymentPurpose::from_metadata(&json!({
            "userId": "merchant-1",
            "planId": "pro",
            "planName": "Pro",
            "billingFrequency": "semiannual",
            "months": 6,
            "type": "platform_subscription"
        }));

        assert_eq!(
            purpose,
            PaymentPurpose::PlatformSubscription {
                user_id: UserId::new("merchant-1").unwrap(),
                plan_id: Some("pro".to_string()),
                plan_name: Some("Pro".to_string()),
                term: BillingTerm::Semiannual,
            }
        );
    }

    #[test]
    fn decodes_snake_case_platform_metadata_from_provider() {
        let purpose = PaymentPurpose::from_metadata(&json!({
            "user_id": "merchant-1",
            "plan_name": "Pro",
            "months": "12",
            "type": "platform_subscription"
        }));

        assert!(matches!(
            purpose,
            PaymentPurpose::PlatformSubscription { term: BillingTerm::Annual, .. }
        ));
    }

    #[test]
    fn platform_term_falls_back_to_frequency_then_monthly() {
        let by_label = PaymentPurpose::from_metadata(&json!({
            "userId": "m", "billingFrequency": "anual", "type": "platform_subscription"
        }));
        assert!(matches!(
            by_label,
            PaymentPurpose::PlatformSubscription { term: BillingTerm::Annual, .. }
        ));

        let bare = PaymentPurpose::from_metadata(&json!({
            "userId": "m", "type": "platform_subscription"
        }));
        assert!(matches!(
            bare,
            PaymentPurpose::PlatformSubscription { term: BillingTerm::Monthly, .. }
        ));
    }

    #[test]
    fn odd_month_count_is_normalized() {
        let purpose = PaymentPurpose::from_metadata(&json!({ "userId": "m", "months": 7 }));
        assert!(matches!(
            purpose,
            PaymentPurpose::PlatformSubscription { term: BillingTerm::Semiannual, .. }
        ));
    }

    #[test]
    fn decodes_client_reactivation() {
        let purpose = PaymentPurpose::from_metadata(&json!({
            "type": "subscription_reactivation",
            "subscription_id": SUB,
            "customer_id": CUSTOMER,
            "user_id": "merchant-1"
        }));

        match purpose {
            PaymentPurpose::ClientSubscription {
                subscription_id,
                customer_id,
                reactivation,
                term,
                ..
            } => {
                assert_eq!(subscription_id.to_string(), SUB);
                assert_eq!(customer_id.map(|c| c.to_string()), Some(CUSTOMER.to_string()));
                assert!(reactivation);
                assert_eq!(term, None);
            }
            other => panic!("Expected client subscription, got {:?}", other),
        }
    }

    #[test]
    fn subscription_id_without_type_is_client_renewal() {
        let purpose = PaymentPurpose::from_metadata(&json!({
            "subscriptionId": SUB,
            "userId": "merchant-1"
        }));
        assert_eq!(purpose.label(), "client_subscription");
    }

    #[test]
    fn client_metadata_with_bad_subscription_id_is_unknown() {
        let purpose = PaymentPurpose::from_metadata(&json!({
            "subscription_id": "not-a-uuid",
            "user_id": "merchant-1"
        }));
        assert_eq!(purpose, PaymentPurpose::Unknown);
    }

    #[test]
    fn order_metadata_is_recognised() {
        let purpose =
            PaymentPurpose::from_metadata(&json!({ "order_id": 991, "order_number": "A-17" }));
        assert_eq!(
            purpose,
            PaymentPurpose::Order {
                order_id: "991".to_string(),
                order_number: Some("A-17".to_string()),
            }
        );
        assert!(purpose.is_order());
        assert_eq!(purpose.owner(), None);
    }

    #[test]
    fn unrelated_metadata_is_unknown() {
        assert_eq!(
            PaymentPurpose::from_metadata(&json!({ "foo": "bar" })),
            PaymentPurpose::Unknown
        );
        assert_eq!(PaymentPurpose::from_metadata(&json!("string")), PaymentPurpose::Unknown);
        assert_eq!(PaymentPurpose::from_metadata(&Value::Null), PaymentPurpose::Unknown);
    }

    #[test]
    fn user_id_alone_is_not_a_platform_payment() {
        assert_eq!(
            PaymentPurpose::from_metadata(&json!({ "user_id": "merchant-1" })),
            PaymentPurpose::Unknown
        );
    }
}
