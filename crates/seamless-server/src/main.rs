mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use seamless_api::middleware::decode_token;
use seamless_api::{AppState, AppStateInner};
use seamless_core::ChatService;
use seamless_db::Database;
use seamless_gateway::{PresenceRegistry, RealtimeBroadcaster, handle_connection};

use crate::config::ServerConfig;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seamless=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Opened database at {}", config.db_path.display());

    // Shared state
    let broadcaster = RealtimeBroadcaster::new(PresenceRegistry::new());
    let state: AppState = Arc::new(AppStateInner {
        chat: ChatService::new(db),
        broadcaster,
        jwt_secret: config.jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(seamless_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Seamless server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The bearer token rides in the query string since browsers cannot set
/// headers on a WebSocket handshake.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(claims) = decode_token(&state.jwt_secret, &query.token) else {
        warn!("Gateway upgrade with invalid token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let chat = state.chat.clone();
    let broadcaster = state.broadcaster.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, chat, broadcaster, claims.sub)))
}
