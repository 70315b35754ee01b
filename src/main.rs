//! subscription-reconciler - payment reconciliation service
//!
//! Long-running service that:
//! - Receives Mercado Pago and PIX notifications and settles paid charges
//! - Exposes owner-scoped cancel / reactivate / check-pending endpoints
//! - Runs the reconciliation sweeper on a fixed interval

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use subscription_reconciler::adapters::http::{self, BillingAppState};
use subscription_reconciler::adapters::mercadopago::{MercadoPagoConfig, MercadoPagoGateway};
use subscription_reconciler::adapters::postgres::{
    PostgresChargeRepository, PostgresLedgerRepository, PostgresSubscriptionRepository,
};
use subscription_reconciler::adapters::scheduling::{
    ReconciliationScheduler, ReconciliationSchedulerConfig,
};
use subscription_reconciler::application::handlers::billing::{
    CancelSubscriptionHandler, ChargeSettler, HandlePaymentWebhookHandler, HandlePixWebhookHandler,
    PaymentEventProcessor, ReactivateSubscriptionHandler, ReconcilePendingChargesHandler,
    SweeperSettings,
};
use subscription_reconciler::config::{AppConfig, PaymentConfig, ServerConfig};
use subscription_reconciler::domain::webhook::MercadoPagoSignatureVerifier;
use subscription_reconciler::ports::{
    ChargeRepository, LedgerRepository, PaymentGateway, SubscriptionRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Starting subscription-reconciler"
    );

    // Storage
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let subscriptions: Arc<dyn SubscriptionRepository> =
        Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let charges: Arc<dyn ChargeRepository> = Arc::new(PostgresChargeRepository::new(pool.clone()));
    let ledger: Arc<dyn LedgerRepository> = Arc::new(PostgresLedgerRepository::new(pool.clone()));

    // Provider
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(MercadoPagoGateway::new(gateway_config(&config.payment))?);

    // Handlers
    let processor = PaymentEventProcessor::new(subscriptions.clone(), ledger);
    let settler = Arc::new(ChargeSettler::new(charges.clone(), processor));

    let verifier = MercadoPagoSignatureVerifier::new(config.payment.webhook_secret())
        .with_tolerance(config.payment.signature_tolerance_secs);
    if !verifier.has_secret() {
        tracing::warn!(
            "No webhook secret configured; Mercado Pago signatures will not be verified"
        );
    }

    let reconcile = Arc::new(ReconcilePendingChargesHandler::new(
        charges.clone(),
        gateway.clone(),
        settler.clone(),
        SweeperSettings {
            batch_size: config.sweeper.batch_size,
            pending_batch_size: config.sweeper.pending_batch_size,
            stalled_after: config.sweeper.stalled_after(),
            refresh_pending: config.sweeper.refresh_pending,
        },
    ));

    let state = BillingAppState {
        payment_webhook: Arc::new(HandlePaymentWebhookHandler::new(
            verifier,
            gateway.clone(),
            charges.clone(),
            settler.clone(),
        )),
        pix_webhook: Arc::new(HandlePixWebhookHandler::new(
            config.payment.pix_webhook_token(),
            charges.clone(),
            settler,
        )),
        cancel_subscription: Arc::new(CancelSubscriptionHandler::new(subscriptions.clone())),
        reactivate_subscription: Arc::new(ReactivateSubscriptionHandler::new(
            subscriptions,
            gateway,
        )),
        reconcile: reconcile.clone(),
    };

    // Background sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = if config.sweeper.enabled {
        let scheduler = ReconciliationScheduler::new(
            reconcile,
            ReconciliationSchedulerConfig::default()
                .with_interval(config.sweeper.interval())
                .with_run_on_start(config.sweeper.run_on_start),
        );
        Some(tokio::spawn(async move { scheduler.run(shutdown_rx).await }))
    } else {
        tracing::warn!("Reconciliation scheduler disabled");
        None
    };

    // HTTP server
    let app = http::app(state, config.server.request_timeout());
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for scheduler");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        handle.await?;
    }

    pool.close().await;
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));

    if server.use_json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn gateway_config(payment: &PaymentConfig) -> MercadoPagoConfig {
    let mut config = MercadoPagoConfig::new(payment.access_token.clone())
        .with_base_url(payment.api_base_url.clone())
        .with_currency(payment.currency.clone())
        .with_timeout(payment.timeout());

    if let Some(url) = &payment.notification_url {
        config = config.with_notification_url(url.clone());
    }
    if let Some(url) = &payment.back_url {
        config = config.with_back_url(url.clone());
    }
    config
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
