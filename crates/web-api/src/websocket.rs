use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashSet;
use volspike_core::Tier;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Subscription tier; defaults to free.
    pub tier: Option<String>,
    /// Comma-separated symbol filter; omitted means all symbols.
    pub symbols: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let tier = match params.tier.as_deref() {
        Some(raw) => match raw.parse::<Tier>() {
            Ok(tier) => tier,
            Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
        },
        None => Tier::Free,
    };
    let symbols = params.symbols.map(parse_symbols);

    ws.on_upgrade(move |socket| websocket_connection(socket, state, tier, symbols))
}

fn parse_symbols(raw: String) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// One delivery loop per connection: pops the connection's queue and writes
/// frames until either side goes away, then deregisters.
async fn websocket_connection(
    mut socket: WebSocket,
    state: AppState,
    tier: Tier,
    symbols: Option<HashSet<String>>,
) {
    let (connection_id, queue) = state.broadcaster.subscribe(tier, symbols).await;

    loop {
        tokio::select! {
            outbound = queue.pop() => {
                match outbound {
                    Some(outbound) => {
                        let json = serde_json::to_string(&outbound).unwrap_or_default();
                        if socket.send(Message::Text(json)).await.is_err() {
                            // Write failure is local to this connection.
                            break;
                        }
                    }
                    // Queue closed: dropped as unhealthy or shut down.
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.broadcaster.unsubscribe(connection_id).await;
    tracing::info!(connection = connection_id, "WebSocket connection closed");
}
