use axum::{Extension, Router};
use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

mod db;
mod gemini_client;
mod handlers;
mod middleware;
mod models;
mod qdrant_client;
mod rate_limit;
mod registry;
mod services;
mod settings;

// AppState holds the database pool, parsed settings, the AI and vector store
// clients, the global rate limiter and the live connection registry.
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub settings: settings::Settings,
    pub gemini_client: gemini_client::GeminiClient,
    pub qdrant_client: qdrant_client::QdrantClient,
    pub rate_limiter: rate_limit::RateLimiter,
    pub registry: registry::ConnectionRegistry,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let settings = settings::Settings::from_env().expect("Invalid configuration");

    // Create the database connection pool and bring the schema up to date
    let db_pool = db::create_pool(&settings.database_url)
        .await
        .expect("Failed to create database pool.");

    let gemini_client = gemini_client::GeminiClient::new(settings.gemini_api_key.clone());

    // The vector store is load-bearing for both upload and chat, so startup
    // fails hard when it is unreachable.
    tracing::info!("Initializing Qdrant vector database...");
    let qdrant_client =
        qdrant_client::QdrantClient::new(&settings.qdrant_url, settings.qdrant_api_key.clone())
            .expect("Failed to connect to Qdrant");
    qdrant_client
        .ensure_collection()
        .await
        .expect("Failed to initialize Qdrant collection");

    let rate_limiter = rate_limit::RateLimiter::new(
        settings.rate_limit,
        Duration::from_secs(settings.time_window_seconds),
    );
    let registry = registry::ConnectionRegistry::new();

    // Background sweep of expired admission entries
    let sweeper = rate_limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            sweeper.sweep();
        }
    });

    let cors_origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<_, _>>()
        .expect("Invalid CORS origin");

    // Credentials ride on cookies, so origins are listed explicitly rather
    // than wildcarded.
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let port = settings.port;

    // Create the shared state
    let shared_state = Arc::new(AppState {
        db_pool,
        settings,
        gemini_client,
        qdrant_client,
        rate_limiter,
        registry,
    });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::chat::chat_routes())
        .merge(handlers::chat_data::chat_data_routes())
        .merge(handlers::pdf::pdf_routes())
        .route("/", axum::routing::get(root))
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging_middleware,
        ))
        .layer(cors)
        .layer(Extension(shared_state.clone()));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind server address");
    tracing::info!(
        "listening on {}",
        listener.local_addr().expect("listener has no local address")
    );
    axum::serve(listener, app).await.expect("Server error");
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,pdf_chat_backend=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,pdf_chat_backend=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // Configure structured logging for production
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        // Human-readable logging for development
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // Log startup information
    tracing::info!("📄 PDF chat backend starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    // Log environment configuration
    let db_configured = std::env::var("DATABASE_URL").is_ok();
    let gemini_configured = std::env::var("GEMINI_API_KEY").is_ok();
    let qdrant_configured = std::env::var("QDRANT_URL").is_ok();

    tracing::info!(
        "Configuration - Database: {}, Gemini AI: {}, Qdrant: {}",
        if db_configured { "✅" } else { "❌" },
        if gemini_configured { "✅" } else { "❌" },
        if qdrant_configured { "✅" } else { "❌" }
    );

    Ok(())
}

async fn root() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({ "message": "chat with pdf AI is live" }))
}

// API Status endpoint
async fn api_status(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    use serde_json::json;

    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    axum::response::Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "gemini_ai": "configured",
            "qdrant_vector_db": "configured"
        },
        "features": {
            "authentication": true,
            "pdf_upload": true,
            "websocket_chat": true,
            "rate_limiting": true
        }
    }))
}
