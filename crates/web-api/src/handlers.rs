use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use volspike_engine::{AlertError, AlertStatus, NewAlert, UpdateAlert, UserAlert};

#[derive(Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<UserAlert>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub alerts: usize,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, message: impl Into<String>) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Maps engine errors onto HTTP responses: malformed alert definitions are
/// surfaced as rejected updates, never accepted silently.
fn map_alert_error(error: &AlertError) -> Rejection {
    match error {
        AlertError::NotFound(id) => {
            reject(StatusCode::NOT_FOUND, format!("alert not found: {id}"))
        }
        e if e.is_rejection() => reject(StatusCode::BAD_REQUEST, e.to_string()),
        e => {
            tracing::error!(error = %e, "alert operation failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Writes an alert's current state through to the durable store, if one is
/// attached.
async fn persist(state: &AppState, alert: &UserAlert) -> Result<(), Rejection> {
    if let Some(store) = &state.store {
        store
            .upsert(alert)
            .await
            .map_err(|e| map_alert_error(&e))?;
    }
    Ok(())
}

/// Lists user alerts, optionally filtered by `status=active|inactive`.
///
/// # Errors
/// Returns `400` for an unknown status filter.
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<AlertListResponse>, Rejection> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<AlertStatus>()
                .map_err(|e| reject(StatusCode::BAD_REQUEST, e))?,
        ),
        None => None,
    };

    let alerts = state.alerts.list(status).await;
    let total = alerts.len();
    Ok(Json(AlertListResponse { alerts, total }))
}

/// Registers a new user alert.
///
/// # Errors
/// Returns `400` when the threshold is unparseable or its unit does not
/// apply to the alert kind.
pub async fn create_alert(
    State(state): State<AppState>,
    Json(request): Json<NewAlert>,
) -> Result<(StatusCode, Json<UserAlert>), Rejection> {
    let alert = state
        .alerts
        .create(request)
        .await
        .map_err(|e| map_alert_error(&e))?;
    persist(&state, &alert).await?;

    Ok((StatusCode::CREATED, Json(alert)))
}

/// Updates an alert's threshold, direction, or delivery method.
///
/// # Errors
/// Returns `404` for unknown alerts and `400` for invalid updates.
pub async fn update_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(request): Json<UpdateAlert>,
) -> Result<Json<UserAlert>, Rejection> {
    let alert = state
        .alerts
        .update(alert_id, request)
        .await
        .map_err(|e| map_alert_error(&e))?;
    persist(&state, &alert).await?;

    Ok(Json(alert))
}

/// Deletes an alert. Deletion is an external operation; the engine itself
/// only ever deactivates.
///
/// # Errors
/// Returns `404` for unknown alerts.
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<StatusCode, Rejection> {
    state
        .alerts
        .remove(alert_id)
        .await
        .map_err(|e| map_alert_error(&e))?;

    if let Some(store) = &state.store {
        store
            .delete(alert_id)
            .await
            .map_err(|e| map_alert_error(&e))?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Reactivates a triggered alert; a no-op when it is already active.
///
/// # Errors
/// Returns `404` for unknown alerts.
pub async fn reactivate_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<UserAlert>, Rejection> {
    let alert = state
        .alerts
        .reactivate(alert_id)
        .await
        .map_err(|e| map_alert_error(&e))?;
    persist(&state, &alert).await?;

    Ok(Json(alert))
}

/// Liveness plus a few counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.connection_count().await,
        alerts: state.alerts.len().await,
    })
}
