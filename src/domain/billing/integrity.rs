//! Subscription integrity validation.
//!
//! Platform and client subscriptions share one table and are told apart by the
//! `(customer_id, plan_id)` pair: both null means platform, both set means client.
//! Any other combination is corruption and is rejected, never coerced.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::SubscriptionId;

use super::SubscriptionRecord;

/// Which side of the shared table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// The merchant's own billing with the operator.
    Platform,
    /// A merchant's customer on a merchant-authored plan.
    Client,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Platform => f.write_str("platform"),
            SubscriptionKind::Client => f.write_str("client"),
        }
    }
}

/// Integrity failures. Callers abort the operation in progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error(
        "Subscription {id} has inconsistent scope fields: customer_id {customer}, plan_id {plan}"
    )]
    MixedScope {
        id: SubscriptionId,
        customer: FieldPresence,
        plan: FieldPresence,
    },

    #[error("Operation '{operation}' requires a {expected} subscription, but {id} is {actual}")]
    KindMismatch {
        id: SubscriptionId,
        operation: String,
        expected: SubscriptionKind,
        actual: SubscriptionKind,
    },
}

impl IntegrityError {
    /// Id of the offending record.
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            IntegrityError::MixedScope { id, .. } | IntegrityError::KindMismatch { id, .. } => *id,
        }
    }
}

/// Whether a discriminator column holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPresence {
    Set,
    Null,
}

impl FieldPresence {
    fn of<T>(value: &Option<T>) -> Self {
        if value.is_some() {
            FieldPresence::Set
        } else {
            FieldPresence::Null
        }
    }
}

impl fmt::Display for FieldPresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPresence::Set => f.write_str("is set"),
            FieldPresence::Null => f.write_str("is null"),
        }
    }
}

/// Classifies a record, rejecting mixed discriminators.
pub fn check_integrity(record: &SubscriptionRecord) -> Result<SubscriptionKind, IntegrityError> {
    match (&record.customer_id, &record.plan_id) {
        (None, None) => Ok(SubscriptionKind::Platform),
        (Some(_), Some(_)) => Ok(SubscriptionKind::Client),
        (customer, plan) => Err(IntegrityError::MixedScope {
            id: record.core.id,
            customer: FieldPresence::of(customer),
            plan: FieldPresence::of(plan),
        }),
    }
}

/// Like [`check_integrity`], additionally requiring `expected` when given.
pub fn check_operation(
    record: &SubscriptionRecord,
    operation: &str,
    expected: Option<SubscriptionKind>,
) -> Result<SubscriptionKind, IntegrityError> {
    let actual = check_integrity(record)?;
    match expected {
        Some(expected) if expected != actual => Err(IntegrityError::KindMismatch {
            id: record.core.id,
            operation: operation.to_string(),
            expected,
            actual,
        }),
        _ => Ok(actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::{client_record, platform_record};
    use crate::domain::foundation::{CustomerId, PlanId};

    #[test]
    fn both_null_is_platform() {
        assert_eq!(
            check_integrity(&platform_record()),
            Ok(SubscriptionKind::Platform)
        );
    }

    #[test]
    fn both_set_is_client() {
        assert_eq!(check_integrity(&client_record()), Ok(SubscriptionKind::Client));
    }

    #[test]
    fn customer_without_plan_is_rejected() {
        let mut record = platform_record();
        record.customer_id = Some(CustomerId::new());

        let err = check_integrity(&record).unwrap_err();
        assert_eq!(err.subscription_id(), record.core.id);
        assert_eq!(
            err,
            IntegrityError::MixedScope {
                id: record.core.id,
                customer: FieldPresence::Set,
                plan: FieldPresence::Null,
            }
        );
    }

    #[test]
    fn plan_without_customer_is_rejected() {
        let mut record = platform_record();
        record.plan_id = Some(PlanId::new());

        assert!(matches!(
            check_integrity(&record),
            Err(IntegrityError::MixedScope { .. })
        ));
    }

    #[test]
    fn error_message_names_record_and_fields() {
        let mut record = platform_record();
        record.customer_id = Some(CustomerId::new());

        let message = check_integrity(&record).unwrap_err().to_string();
        assert!(message.contains(&record.core.id.to_string()));
        assert!(message.contains("customer_id is set"));
        assert!(message.contains("plan_id is null"));
    }

    #[test]
    fn check_operation_rejects_kind_mismatch() {
        let record = platform_record();
        let result = check_operation(&record, "reactivate", Some(SubscriptionKind::Client));

        assert_eq!(
            result,
            Err(IntegrityError::KindMismatch {
                id: record.core.id,
                operation: "reactivate".to_string(),
                expected: SubscriptionKind::Client,
                actual: SubscriptionKind::Platform,
            })
        );
    }

    #[test]
    fn check_operation_without_expectation_only_checks_integrity() {
        assert_eq!(
            check_operation(&client_record(), "cancel", None),
            Ok(SubscriptionKind::Client)
        );
    }

    #[test]
    fn check_operation_reports_corruption_before_mismatch() {
        let mut record = client_record();
        record.plan_id = None;

        assert!(matches!(
            check_operation(&record, "reactivate", Some(SubscriptionKind::Client)),
            Err(IntegrityError::MixedScope { .. })
        ));
    }
}
