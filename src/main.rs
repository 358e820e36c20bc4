use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use enrichd::api::enrichments::enrichments_config;
use enrichd::api::health::health_config;
use enrichd::api::job::{job_config, JobService};
use enrichd::api::validation;
use enrichd::app::AppCore;
use enrichd::cli::Cli;
use enrichd::config::Config;
use enrichd::db::catalog::Catalog;
use enrichd::enrichment::EnrichmentRegistry;
use enrichd::secrets::{FileSecretStore, NoSecretStore, SecretResolver, SecretStore};
use enrichd::shutdown::ShutdownCoordinator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    if let Some(data_dir) = &cli.data_dir {
        std::env::set_var("DATA_DIR", data_dir);
    }

    // Load configuration from environment, then apply CLI overrides
    let mut config = Config::from_env().expect("Failed to load configuration");
    cli.apply(&mut config);
    let Config {
        data_dir,
        bind_addr,
        max_payload_size,
        log_dir,
        secrets_file,
    } = config;

    // Create logs directory if it doesn't exist
    std::fs::create_dir_all(&log_dir).expect("Failed to create logs directory");

    // Initialize file-based logging with daily rotation and level separation
    // Log files will be created as: logs/info.2024-12-22.log, logs/error.2024-12-22.log, etc.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // Create daily rotating file appenders for each log level
    let info_file = tracing_appender::rolling::daily(&log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(&log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(&log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(&log_dir, "debug.log");

    // Create layers for each log level
    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    // Create console/stdout layer for terminal output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    // Initialize the subscriber with all layers (including console)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();

    info!("Starting enrichd");
    info!("  - Data directory: {}", data_dir);
    info!("  - Bind address: {}", bind_addr);
    info!("  - Max payload size: {} bytes", max_payload_size);

    // Open every database in the data directory; bookkeeping tables are
    // created on demand inside each one
    let catalog = Catalog::open(&data_dir)
        .await
        .expect("Failed to open database catalog");
    info!("Database catalog opened: {:?}", catalog.names());

    // The enrichment registry is populated once here and read-only afterwards
    let registry = EnrichmentRegistry::with_builtins();

    let store: Box<dyn SecretStore> = match &secrets_file {
        Some(path) => Box::new(FileSecretStore::load(path).expect("Failed to load secrets file")),
        None => Box::new(NoSecretStore),
    };
    let secrets = SecretResolver::new(store);

    // Create shutdown channel for graceful shutdown
    // watch channel allows multiple receivers to get the same value
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let core = Arc::new(AppCore::new(catalog, registry, secrets, shutdown_rx));

    // Re-launch any job that was mid-run when the previous process stopped
    core.recovery_sweep().await;

    let server_core = core.clone();
    let server = HttpServer::new(move || {
        let job_service = web::Data::new(JobService::new(server_core.clone()));

        // Configure payload size limits globally
        let payload_config = web::PayloadConfig::default().limit(max_payload_size);

        App::new()
            .app_data(web::Data::new(server_core.clone())) // Share core state across workers
            .app_data(job_service)
            .app_data(payload_config)
            .app_data(validation::json_config()) // Global validation config
            .configure(health_config)
            .configure(enrichments_config)
            .configure(job_config)
    });

    info!("Server starting on http://{}", bind_addr);

    // Bind and start the server
    let server = server.bind(bind_addr.as_str())?.run();

    // Get server handle for graceful shutdown
    let server_handle = server.handle();

    // Spawn server in background
    let server_task = tokio::spawn(server);

    // Create shutdown coordinator and wait for shutdown signal
    let coordinator = ShutdownCoordinator::new(server_handle, server_task, core, shutdown_tx);

    coordinator.wait_for_shutdown().await
}
