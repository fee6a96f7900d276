use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use project_settlement::application::coordinator::SettlementCoordinator;
use project_settlement::application::escrow::EscrowManager;
use project_settlement::application::gateway::PaymentGateway;
use project_settlement::config::{Cli, Command, ServerArgs};
use project_settlement::domain::ports::{LedgerStoreRef, PaymentProviderRef};
use project_settlement::infrastructure::in_memory::InMemoryLedgerStore;
use project_settlement::infrastructure::notifier::TracingNotifier;
use project_settlement::infrastructure::provider::{HttpPaymentProvider, SandboxProvider};
use project_settlement::infrastructure::signature::WebhookVerifier;
use project_settlement::interfaces::csv::pending_report::PendingPaymentWriter;
use project_settlement::interfaces::http::auth::JwtConfig;
use project_settlement::interfaces::http::router::build_router;
use project_settlement::interfaces::http::state::AppState;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is reserved for reports.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "project_settlement=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db_path.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(store, cli.server).await,
        Command::PendingPayments { older_than_mins } => pending_payments(store, older_than_mins).await,
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<LedgerStoreRef> {
    use project_settlement::infrastructure::rocksdb::RocksDBLedgerStore;

    match db_path {
        Some(path) => {
            let store = RocksDBLedgerStore::open(path).into_diagnostic()?;
            tracing::info!(path = %path.display(), "using RocksDB ledger");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<LedgerStoreRef> {
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "--db-path requires the storage-rocksdb feature, falling back to the in-memory ledger"
        );
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

async fn serve(store: LedgerStoreRef, args: ServerArgs) -> Result<()> {
    let jwt_secret = args
        .jwt_secret
        .clone()
        .ok_or_else(|| miette!("JWT_SECRET (or --jwt-secret) must be set to serve"))?;
    let webhook_secret = args
        .webhook_secret
        .clone()
        .ok_or_else(|| miette!("WEBHOOK_SECRET (or --webhook-secret) must be set to serve"))?;

    let provider: PaymentProviderRef = match &args.provider_api_key {
        Some(key) => Arc::new(HttpPaymentProvider::new(&args.provider_base_url, key)),
        None => {
            tracing::warn!("no provider API key configured, using the sandbox provider");
            Arc::new(SandboxProvider::new())
        }
    };

    let escrow = EscrowManager::new(store.clone());
    let coordinator = SettlementCoordinator::new(store.clone(), escrow, Arc::new(TracingNotifier));
    let gateway = PaymentGateway::new(
        store,
        provider,
        WebhookVerifier::new(webhook_secret, args.webhook_tolerance_secs),
        &args.currency,
        args.intent_timeout(),
    );
    let state = AppState::new(coordinator, gateway, JwtConfig::new(jwt_secret));
    let app = build_router(state, args.request_timeout());

    let addr = SocketAddr::new(args.host.parse::<IpAddr>().into_diagnostic()?, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn pending_payments(store: LedgerStoreRef, older_than_mins: i64) -> Result<()> {
    let now = Utc::now();
    let escrow = EscrowManager::new(store.clone());
    let coordinator = SettlementCoordinator::new(store, escrow, Arc::new(TracingNotifier));
    let cutoff = ChronoDuration::try_minutes(older_than_mins)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| miette!("--older-than-mins {older_than_mins} reaches outside the supported date range"))?;
    let payments = coordinator
        .pending_payments_before(cutoff)
        .await
        .into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = PendingPaymentWriter::new(stdout.lock());
    writer.write_payments(&payments, now).into_diagnostic()?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
