use dbprov::config::CONFIG;
use dbprov::gateway::MySqlGateway;
use dbprov::reconcile::Reconciler;
use dbprov::server::{AppState, app_router};
use mimalloc::MiMalloc;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = &*CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
        listen_addr = %cfg.basic.listen_addr,
        listen_port = cfg.basic.listen_port,
        reconcile_timeout = ?cfg.controller.reconcile_timeout(),
        resync_interval = ?cfg.controller.resync_interval(),
        max_concurrent_reconciles = cfg.controller.max_concurrent_reconciles,
        reconciles_per_second = cfg.controller.reconciles_per_second,
        connect_timeout = ?cfg.gateway.connect_timeout(),
        "Configuration loaded"
    );

    let store = dbprov::store::spawn(&cfg.basic.database_url).await?;
    let gateway = Arc::new(MySqlGateway::new(&cfg.gateway));
    let reconciler = Arc::new(Reconciler::from_store(
        store.clone(),
        gateway,
        cfg.controller.reconcile_timeout(),
    ));
    let controller = dbprov::controller::spawn(reconciler, cfg.controller.clone()).await?;

    // Level-triggered start: everything already stored gets one pass.
    let initial = dbprov::controller::enqueue_all(&store, &controller).await?;
    info!(count = initial, "Initial reconciliation enqueued");

    if let Some(every) = cfg.controller.resync_interval() {
        tokio::spawn(dbprov::controller::run_resync(
            store.clone(),
            controller.clone(),
            every,
        ));
    }

    let app = app_router(AppState::new(store, controller.clone()));

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.stop();
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
