//! HTTP server implementation using Axum.

use crate::handler::{handle_api, handle_health};
use crate::socket::handle_ws;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use devbridge_core::{RpcConfig, RpcGroup, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Group every WebSocket channel joins and one-shot calls dispatch through
    pub group: RpcGroup,
}

/// Build the router for the WebSocket, one-shot and health routes.
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(ServerConfig::HEALTH_PATH, get(handle_health))
        .route(ServerConfig::WS_PATH, get(handle_ws))
        .route(
            ServerConfig::API_PATH,
            post(handle_api).layer(DefaultBodyLimit::max(RpcConfig::MAX_ONE_SHOT_BODY_BYTES)),
        )
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
