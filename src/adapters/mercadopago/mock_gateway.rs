//! Mock payment gateway for testing.
//!
//! Serves pre-configured provider resources and supports:
//! - Error injection per method
//! - Call tracking
//! - Recording created checkout preferences

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{
    CheckoutPreference, CheckoutPreferenceRequest, PaymentError, PaymentGateway,
    ProviderAuthorizedPayment, ProviderPayment, ProviderPreapproval,
};

/// Mock payment gateway.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.add_payment(payment);
/// gateway.set_method_error("get_payment", PaymentError::network("down"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    payments: HashMap<String, ProviderPayment>,
    preapprovals: HashMap<String, ProviderPreapproval>,
    authorized_payments: HashMap<String, ProviderAuthorizedPayment>,
    preference_requests: Vec<CheckoutPreferenceRequest>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_payment(&self, payment: ProviderPayment) {
        self.state().payments.insert(payment.id.clone(), payment);
    }

    pub fn add_preapproval(&self, preapproval: ProviderPreapproval) {
        self.state()
            .preapprovals
            .insert(preapproval.id.clone(), preapproval);
    }

    pub fn add_authorized_payment(&self, payment: ProviderAuthorizedPayment) {
        self.state()
            .authorized_payments
            .insert(payment.id.clone(), payment);
    }

    /// Fail every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn call_count(&self, method: &str) -> usize {
        self.state().call_log.iter().filter(|m| *m == method).count()
    }

    pub fn preference_requests(&self) -> Vec<CheckoutPreferenceRequest> {
        self.state().preference_requests.clone()
    }

    fn begin(&self, method: &str) -> Result<MutexGuard<'_, MockState>, PaymentError> {
        let mut state = self.state();
        state.call_log.push(method.to_string());
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, PaymentError> {
        self.begin("get_payment")?
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found("Payment"))
    }

    async fn get_preapproval(
        &self,
        preapproval_id: &str,
    ) -> Result<ProviderPreapproval, PaymentError> {
        self.begin("get_preapproval")?
            .preapprovals
            .get(preapproval_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found("Preapproval"))
    }

    async fn get_authorized_payment(
        &self,
        authorized_payment_id: &str,
    ) -> Result<ProviderAuthorizedPayment, PaymentError> {
        self.begin("get_authorized_payment")?
            .authorized_payments
            .get(authorized_payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found("Authorized payment"))
    }

    async fn create_checkout_preference(
        &self,
        request: CheckoutPreferenceRequest,
    ) -> Result<CheckoutPreference, PaymentError> {
        let mut state = self.begin("create_checkout_preference")?;
        state.preference_requests.push(request);
        let n = state.preference_requests.len();
        Ok(CheckoutPreference {
            id: format!("pref_mock_{}", n),
            init_point: format!("https://mock.mercadopago.test/checkout/pref_mock_{}", n),
        })
    }
}
