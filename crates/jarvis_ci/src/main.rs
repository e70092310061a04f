mod app;

use actix_web::{web, App as ActixApp, HttpServer};
use jarvis_ci::config::{self, Config};
use jarvis_ci::models::error::StartupError;
use jarvis_ci::routes::api;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    if config.format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // Load configuration
    let config_path = std::env::var("JARVIS_CONFIG")
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(Some(&config_path))?;

    init_tracing(&config.logging);
    info!("Starting Jarvis CI");
    app::print_config(&config);

    // Initialize application
    let app = app::App::initialize(&config).await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    // Start background maintenance
    let maintenance_handle = config
        .maintenance
        .enabled
        .then(|| app.maintenance(&config).start());

    // Start HTTP server
    let state = web::Data::new(app.state());
    let base_path = config.server.base_path.clone();
    let server_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", server_addr);
    let server = HttpServer::new(move || {
        let base_path = base_path.clone();
        ActixApp::new()
            .app_data(state.clone())
            .configure(move |cfg| api::configure(cfg, &base_path))
    })
    .bind(&server_addr)?
    .disable_signals()
    .run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for shutdown signal
    info!("Jarvis CI started successfully");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Graceful shutdown
    info!("Initiating graceful shutdown");
    server_handle.stop(true).await;
    if !app.scheduler.wait_for_completion(Duration::from_secs(300)).await {
        warn!("Graceful shutdown timeout exceeded");
    }

    if let Some(handle) = maintenance_handle {
        handle.abort();
    }
    if let Err(e) = server_task.await {
        warn!("HTTP server task ended abnormally: {}", e);
    }

    info!("Jarvis CI stopped");
    Ok(())
}
