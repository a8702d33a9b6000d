use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trv_schedule_service::{
    activity::ActivityChecker,
    api::{self, auth::Credentials, AppState},
    config::Config,
    db::Stores,
    schedule::ScheduleService,
    trv::TrvService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let stores = Stores::open(&config.storage_dir)
        .await
        .with_context(|| format!("failed to open storage under {}", config.storage_dir.display()))?;
    info!(storage_dir = %config.storage_dir.display(), "Record stores ready");

    let trvs = TrvService::new(&stores);
    let schedules = ScheduleService::new(&stores);

    if config.activity_checker_enabled {
        let checker = ActivityChecker::new(schedules.clone(), trvs.clone(), config.activity_interval());
        tokio::spawn(checker.run());
    } else {
        info!("Activity checker disabled");
    }

    let app = api::router(
        AppState { trvs, schedules },
        Credentials::new(config.auth_username, config.auth_password),
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
