use autowatch_core::state::{StateManager, WatchState};
use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn router(state_manager: Arc<StateManager>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/health", get(health))
        .with_state(state_manager)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("Status API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_status(State(state_manager): State<Arc<StateManager>>) -> Json<WatchState> {
    Json(state_manager.get_state().await)
}

async fn health() -> &'static str {
    "ok"
}
