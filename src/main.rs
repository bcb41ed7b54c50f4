use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod services;
mod store;

use config::Config;
use services::genius::GeniusClient;
use services::limits::UsageLimiter;
use services::resolver::ContextResolver;
use store::{CacheStore, SessionDirectory};

#[derive(Clone)]
pub struct AppState {
    pub store: CacheStore,
    pub sessions: SessionDirectory,
    pub resolver: ContextResolver,
    pub limits: UsageLimiter,
    pub genius: GeniusClient,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "akili_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    // Store
    let store = CacheStore::connect(&config.redis_url)
        .await
        .expect("Failed to connect to the key-value store");
    tracing::info!("Key-value store connected");

    // One shared HTTP client; every external call is bounded by its timeout
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");

    let genius = GeniusClient::new(
        http.clone(),
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    );

    let state = AppState {
        sessions: SessionDirectory::new(store.clone()),
        resolver: ContextResolver::new(store.clone()),
        limits: UsageLimiter::new(store.clone()),
        store,
        genius,
        http,
        config: config.clone(),
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/payments/webhook", post(handlers::payments::webhook));

    let protected_routes = Router::new()
        // Uploads
        .route("/upload/document", post(handlers::upload::upload_document))
        .route("/upload/image", post(handlers::upload::upload_image))
        .route("/upload/chat", post(handlers::chat::continue_chat))
        // Chat
        .route("/chat/", post(handlers::chat::continue_chat))
        // Sessions
        .route("/sessions/", get(handlers::sessions::list_sessions))
        .route("/sessions/:id", get(handlers::sessions::get_session))
        .route("/sessions/:id", delete(handlers::sessions::delete_session))
        // Study
        .route("/study/start", post(handlers::study::start_study))
        .route("/study/end", post(handlers::study::end_study))
        .route("/study/analyze-exam", post(handlers::study::analyze_exam))
        // Payments
        .route(
            "/payments/initialize-mpesa",
            post(handlers::payments::initialize_mpesa),
        )
        // Account
        .route(
            "/auth/merge-guest-session",
            post(handlers::auth::merge_guest_session),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config.ui_origin.parse::<axum::http::HeaderValue>().unwrap()];
        for origin in &config.cors_extra_origins {
            match origin.parse::<axum::http::HeaderValue>() {
                Ok(hv) => origins.push(hv),
                Err(_) => tracing::warn!(origin = %origin, "Skipping unparseable CORS origin"),
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Multipart framing overhead on top of the configured file cap
        .layer(DefaultBodyLimit::max(config.max_upload_bytes + 64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
