use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

mod api;
mod config;
mod db;
mod engine;
mod notify;
mod portal;
mod security;
mod shutdown;

use crate::api::{
    health::health_config,
    reschedule::{handlers::re_schedule_config, ReScheduleService},
    subject::{handlers::subject_config, SubjectService},
    validation,
};
use crate::engine::{Clock, Engine};
use crate::security::Secrets;
use crate::shutdown::ShutdownCoordinator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from environment
    let config = Arc::new(config::Config::from_env().expect("Failed to load configuration"));

    // Create logs directory if it doesn't exist
    std::fs::create_dir_all(&config.log_dir).expect("Failed to create logs directory");

    // File-based logging with daily rotation plus console output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(&config.log_dir, "reslot.log");
    let error_file = tracing_appender::rolling::daily(&config.log_dir, "error.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(error_layer)
        .init();

    info!("Starting reslot");
    info!("  - Portal base URL: {}", config.portal_base_url);
    info!("  - Automation host: {}", config.webdriver_url);
    info!("  - Scan interval: {}s", config.scan_interval_secs);
    info!("  - Poll interval: {}s", config.poll_interval_secs);

    let secrets = Arc::new(Secrets::from_key(&config.fernet_key).expect("Invalid FERNET_KEY"));

    // Get database connection pool
    let pool = db::connection::get_connection(&config.database_url)
        .await
        .expect("Failed to connect to database");
    info!("Database connection pool established");

    // Run migrations on startup
    db::migrations::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // The engine is built once here and handed around by clone; there is
    // no global scheduler instance
    let engine = Engine::new(pool.clone(), config.clone(), secrets.clone(), Clock::system());

    // Recover SCHEDULED jobs left behind by a previous process
    engine.reconcile_on_startup().await;

    // Shutdown channel; watch lets every loop observe the same flag
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Background scan loop admitting due PENDING jobs
    let scan_handle = engine.spawn_scan_loop(shutdown_rx);

    let server_pool = pool.clone();
    let server_config = config.clone();
    let server_engine = engine.clone();
    let server_secrets = secrets.clone();

    let server = HttpServer::new(move || {
        let re_schedule_service = web::Data::new(ReScheduleService::new(
            server_pool.clone(),
            server_engine.clone(),
        ));
        let subject_service = web::Data::new(SubjectService::new(
            server_pool.clone(),
            server_secrets.clone(),
            server_engine.clone(),
        ));

        let payload_config = web::PayloadConfig::default().limit(server_config.max_payload_size);

        App::new()
            .app_data(web::Data::new(server_pool.clone()))
            .app_data(re_schedule_service)
            .app_data(subject_service)
            .app_data(payload_config)
            .app_data(validation::json_config())
            .configure(health_config)
            .configure(re_schedule_config)
            .configure(subject_config)
    });

    info!("Server starting on http://{}", config.bind_addr);

    let server = server.bind(config.bind_addr.as_str())?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        scan_handle,
        shutdown_tx,
        pool,
    );

    coordinator.wait_for_shutdown().await
}
