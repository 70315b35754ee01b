//! ReconciliationScheduler - Background loop driving the sweeper.
//!
//! Runs a global sweep on a fixed interval so paid charges whose webhook was
//! lost still reach their subscription.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 5 min | Time between sweeps |
//! | `run_on_start` | true | Sweep immediately when the loop starts |
//!
//! ## Graceful Shutdown
//!
//! The loop listens on a watch channel. A sweep in progress is allowed to
//! finish; no new sweep starts after the signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::handlers::billing::{
    ReconcilePendingChargesCommand, ReconcilePendingChargesHandler, SweepReport,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct ReconciliationSchedulerConfig {
    pub interval: Duration,
    pub run_on_start: bool,
}

impl Default for ReconciliationSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            run_on_start: true,
        }
    }
}

impl ReconciliationSchedulerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

/// Periodic global reconciliation.
pub struct ReconciliationScheduler {
    handler: Arc<ReconcilePendingChargesHandler>,
    config: ReconciliationSchedulerConfig,
}

impl ReconciliationScheduler {
    pub fn new(
        handler: Arc<ReconcilePendingChargesHandler>,
        config: ReconciliationSchedulerConfig,
    ) -> Self {
        Self { handler, config }
    }

    /// Run sweeps until the shutdown signal is received.
    ///
    /// A failed sweep is logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately
        if !self.config.run_on_start {
            interval.tick().await;
        }

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Reconciliation scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Reconciliation scheduler stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.poll_once(Timestamp::now()).await {
                        tracing::error!(error = %e, "Scheduled reconciliation sweep failed");
                    }
                }
            }
        }
    }

    /// Run exactly one global sweep.
    pub async fn poll_once(&self, now: Timestamp) -> Result<SweepReport, BillingError> {
        self.handler
            .handle(ReconcilePendingChargesCommand { owner_id: None, now })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryChargeRepository, InMemoryLedgerRepository, InMemorySubscriptionRepository,
    };
    use crate::adapters::mercadopago::MockPaymentGateway;
    use crate::application::handlers::billing::{
        ChargeSettler, PaymentEventProcessor, SweeperSettings,
    };
    use crate::domain::billing::{PaymentMethod, ProviderCharge};
    use crate::domain::foundation::UserId;
    use crate::ports::ChargeRepository;
    use serde_json::json;

    fn scheduler(
        charges: &InMemoryChargeRepository,
        config: ReconciliationSchedulerConfig,
    ) -> ReconciliationScheduler {
        let processor = PaymentEventProcessor::new(
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(InMemoryLedgerRepository::new()),
        );
        let settler = Arc::new(ChargeSettler::new(Arc::new(charges.clone()), processor));
        let handler = ReconcilePendingChargesHandler::new(
            Arc::new(charges.clone()),
            Arc::new(MockPaymentGateway::new()),
            settler,
            SweeperSettings::default(),
        );
        ReconciliationScheduler::new(Arc::new(handler), config)
    }

    async fn paid_platform_charge(charges: &InMemoryChargeRepository) {
        let now = Timestamp::now();
        charges
            .record_paid(
                ProviderCharge {
                    owner_id: UserId::new("merchant-1").unwrap(),
                    external_id: "pay-1".to_string(),
                    amount_cents: 4990,
                    payment_method: PaymentMethod::Pix,
                    metadata: json!({"type": "platform_subscription", "user_id": "merchant-1", "months": 1}),
                    paid_at: now,
                },
                now,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn poll_once_sweeps_globally() {
        let charges = InMemoryChargeRepository::new();
        paid_platform_charge(&charges).await;

        let report = scheduler(&charges, ReconciliationSchedulerConfig::default())
            .poll_once(Timestamp::now())
            .await
            .unwrap();

        assert_eq!(report.processed.len(), 1);
    }

    #[tokio::test]
    async fn run_sweeps_on_start_and_stops_on_signal() {
        let charges = InMemoryChargeRepository::new();
        paid_platform_charge(&charges).await;

        let config =
            ReconciliationSchedulerConfig::default().with_interval(Duration::from_millis(20));
        let scheduler = Arc::new(scheduler(&charges, config));
        let (tx, rx) = watch::channel(false);

        let task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert!(charges.list_paid_unprocessed(None, 10).await.unwrap().is_empty());
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = ReconciliationSchedulerConfig::default()
            .with_interval(Duration::from_secs(30))
            .with_run_on_start(false);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert!(!config.run_on_start);
    }
}
