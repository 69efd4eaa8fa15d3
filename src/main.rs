// src/main.rs

use std::{str::FromStr, sync::Arc, time::Duration};

use dotenvy::dotenv;
use proctor::{
    config::Config,
    routes,
    services::{Services, bridge::BrowserBridge},
    session::SessionHandle,
    state::AppState,
    store::{SqliteStore, seed_demo_exam},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "proctor.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .expect("DATABASE_URL must be a valid SQLite URL")
        .create_if_missing(true)
        .foreign_keys(true);

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(connect_options.clone())
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to open database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if config.seed_demo_exam {
        if let Err(e) = seed_demo_exam(&pool, config.exam_id).await {
            tracing::error!("Failed to seed demo exam: {:?}", e);
        }
    }

    let store = Arc::new(SqliteStore::new(pool, config.recording_dir.clone()));
    let bridge = BrowserBridge::new();
    let shared_bridge = Arc::new(bridge.clone());

    let services = Services {
        exams: store.clone(),
        attempts: store.clone(),
        autosave: store.clone(),
        submit: store.clone(),
        recordings: store,
        detector: shared_bridge.clone(),
        frames: shared_bridge.clone(),
        devices: shared_bridge,
    };

    let session = SessionHandle::spawn(
        config.exam_id,
        config.candidate_id.clone(),
        services,
        config.session.clone(),
    );
    tracing::info!(
        exam_id = config.exam_id,
        candidate = %config.candidate_id,
        "Session ready, waiting for start"
    );

    let state = AppState { session, bridge };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}
