use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use freightgate::database::DatabaseManager;
use freightgate::handlers::{auth, shifting};
use freightgate::middleware::authenticate;
use freightgate::state::AppState;
use freightgate::store::{MemoryAuthStore, PgAuthStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = freightgate::config::config();
    info!("Starting Freightgate in {:?} mode", config.environment);

    let store: Arc<dyn Store> = if std::env::var("DATABASE_URL").is_ok() {
        let store = PgAuthStore::connect().await?;
        store.ensure_schema().await?;
        DatabaseManager::health_check().await?;
        Arc::new(store)
    } else {
        warn!("DATABASE_URL not set; using in-memory store (data is not persisted)");
        Arc::new(MemoryAuthStore::new())
    };

    let app = app(AppState::new(store));

    // Allow tests or deployments to override port via env
    let port = std::env::var("FREIGHTGATE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Freightgate listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_auth_routes())
        .merge(protected_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/token/refresh", post(auth::refresh))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/auth/sessions", get(auth::list_sessions))
        .route("/api/auth/sessions/:id/revoke", post(auth::revoke_session))
        .route("/api/shifting/request", post(shifting::request_shift))
        .route("/api/shifting/history", get(shifting::history))
        .route("/api/shifting/:id/revoke", post(shifting::revoke))
        .route("/api/shifting/validate", post(shifting::validate))
        .route_layer(from_fn_with_state(state, authenticate))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "freightgate",
        "description": "Shipment tracking auth and token shifting gateway",
        "endpoints": {
            "health": "/health",
            "auth": "/auth",
            "api": "/api"
        }
    }))
}

async fn health() -> Json<Value> {
    let database = if std::env::var("DATABASE_URL").is_ok() {
        match DatabaseManager::health_check().await {
            Ok(()) => "up",
            Err(_) => "down",
        }
    } else {
        "in-memory"
    };

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}
