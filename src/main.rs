use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use stonecraft_api::{
    build_router,
    config::{self, AppConfig},
    db,
    events::{process_events, EventProcessor, EventSender},
    gateway::{razorpay::RazorpayClient, PaymentGateway},
    notifications::LogMailer,
    AppState,
};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level.as_str(), cfg.log_json);
    info!(environment = %cfg.environment, "Starting Stonecraft storefront API");

    let db = Arc::new(db::establish_connection_from_app_config(&cfg).await?);
    if cfg.auto_migrate {
        db::run_migrations(&db).await?;
    } else {
        info!("Auto-migrate disabled; expecting an up-to-date schema");
    }

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let mailer = Arc::new(LogMailer::new(cfg.mail_from.clone()));
    tokio::spawn(process_events(
        event_rx,
        EventProcessor::new(db.clone(), mailer),
    ));

    let gateway = payment_gateway(&cfg)?;
    let addr = listen_addr(&cfg)?;

    let state = AppState::new(db, cfg, EventSender::new(event_tx), gateway);
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn payment_gateway(cfg: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    if cfg.razorpay.key_id.is_empty() || cfg.razorpay.key_secret.is_empty() {
        warn!("Razorpay credentials are not configured; online payments will fail");
    }
    let client = RazorpayClient::new(&cfg.razorpay).context("failed to build Razorpay client")?;
    Ok(Arc::new(client))
}

fn listen_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
