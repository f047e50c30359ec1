//! services/api/src/bin/api.rs

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    web::{router, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vocab_core::{
    ports::{AchievementStore, PreferenceLookup, ProgressStore, QuizCatalog},
    ProgressConfig, ProgressService,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool, config.mastery_ceiling));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Wire the Progress Service ---
    let store: Arc<dyn ProgressStore> = db_adapter.clone();
    let prefs: Arc<dyn PreferenceLookup> = db_adapter.clone();
    let quizzes: Arc<dyn QuizCatalog> = db_adapter.clone();
    let achievements: Arc<dyn AchievementStore> = db_adapter;
    let service = ProgressService::new(
        store,
        prefs,
        quizzes,
        achievements,
        ProgressConfig {
            mastery_ceiling: config.mastery_ceiling,
            default_daily_goal: config.default_daily_goal,
            default_time_zone: config.default_time_zone,
        },
    );

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        service,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let app = router(app_state).layer(cors);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
