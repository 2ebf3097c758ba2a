use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use board_warden::board::TrelloClient;
use board_warden::config::WardenConfig;
use board_warden::notify::{LogNotifier, Notifier, SlackNotifier};
use board_warden::pipeline::{EventProcessor, SweepProcessor, ViolationTracker, spawn_sweep_ticker};
use board_warden::store::{LibSqlBackend, ViolationStore};
use board_warden::webhook::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WardenConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("Board Warden v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook:   http://0.0.0.0:{}/", config.port);
    eprintln!("   Sweep:     {}", config.sweep.schedule);
    eprintln!("   Database:  {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ViolationStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── External services ────────────────────────────────────────────────
    let trello = Arc::new(TrelloClient::new(config.trello.clone()));
    let notifier: Arc<dyn Notifier> = match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone())),
        None => {
            tracing::warn!("SLACK_WEBHOOK_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // ── Pipeline ─────────────────────────────────────────────────────────
    let tracker = Arc::new(ViolationTracker::new(
        Arc::clone(&store),
        notifier,
        config.renotify,
    ));
    let processor = Arc::new(EventProcessor::new(trello.clone(), Arc::clone(&tracker)));
    let sweep = Arc::new(SweepProcessor::new(
        trello.clone(),
        Arc::clone(&tracker),
        config.sweep.concurrency,
    ));

    let schedule = config.sweep.cron_schedule()?;
    let _sweep_ticker = spawn_sweep_ticker(Arc::clone(&sweep), schedule);
    tracing::info!(schedule = %config.sweep.schedule, "Sweep ticker started");

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook::routes(AppState {
        processor,
        sweep,
        store,
        registrar: trello,
        public_url: config.public_url.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server failed")?;

    tracing::info!("Shut down");
    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "board-warden.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
