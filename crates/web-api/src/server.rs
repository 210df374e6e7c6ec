use crate::{handlers, websocket};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use volspike_broadcast::Broadcaster;
use volspike_engine::{AlertBook, AlertStore};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub alerts: Arc<AlertBook>,
    pub store: Option<Arc<AlertStore>>,
    pub broadcaster: Arc<Broadcaster>,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/alerts", get(handlers::list_alerts))
            .route("/alerts", post(handlers::create_alert))
            .route("/alerts/:alert_id", patch(handlers::update_alert))
            .route("/alerts/:alert_id", delete(handlers::delete_alert))
            .route("/alerts/:alert_id/reactivate", post(handlers::reactivate_alert))
            .route("/health", get(handlers::health))
            .route("/ws", get(websocket::websocket_handler))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Alert API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
