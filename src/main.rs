use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use visit_notify::api;
use visit_notify::app::AppContext;
use visit_notify::config::Config;
use visit_notify::models::Frequency;
use visit_notify::visits::{Scheduler, TickFuture};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let app = Arc::new(AppContext::from_config(&config).await?);
    info!(site = %config.notifications.site_name, "Visit pipeline ready");

    let scheduler = if config.scheduler.enabled {
        let tick_app = Arc::clone(&app);
        Some(Scheduler::start(
            config.scheduler.intervals(),
            move |frequency: Frequency| -> TickFuture {
                let app = Arc::clone(&tick_app);
                Box::pin(async move {
                    match app.run_tick(frequency).await {
                        Ok(Some(report)) => info!(
                            frequency = %frequency,
                            notified = report.notified,
                            failed = report.failed,
                            "Tick finished"
                        ),
                        Ok(None) => {}
                        Err(e) => error!(frequency = %frequency, error = %e, "Tick failed"),
                    }
                })
            },
        ))
    } else {
        info!("Scheduler disabled; ticks must be triggered via /api/ticks");
        None
    };

    let router = api::create_api_router(Arc::clone(&app));

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 API server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    Ok(())
}
