use crate::auth::require_auth;
use crate::error::ApiError;
use crate::pipeline;
use crate::state::AppState;
use crate::upload::{IncidentSubmission, UPLOADS_ROUTE};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use emberlog_core::health::HealthReport;
use emberlog_core::incident::Incident;
use serde_json::{json, Value};
use tower_http::services::ServeDir;

pub fn router(state: AppState) -> Router {
    // Mutating routes. Multipart bodies are bounded per part by the upload
    // stage, so the blanket body cap is lifted here.
    let protected = Router::new()
        .route("/api/incidents", post(create_incident))
        .route("/api/incidents/:id", put(update_incident).delete(delete_incident))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::disable());

    let app = Router::new()
        .route("/api/incidents", get(list_incidents))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(&state.config.upload_dir))
        .fallback(|| async { ApiError::RouteNotFound })
        .with_state(state.clone());

    pipeline::apply(app, &state)
}

async fn list_incidents(State(state): State<AppState>) -> Json<Vec<Incident>> {
    let incidents = state.store.get_all().await;
    tracing::debug!(count = incidents.len(), "Listing incidents");
    Json(incidents)
}

async fn create_incident(
    State(state): State<AppState>,
    submission: IncidentSubmission,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    let (draft, _) = submission.validate().await?;
    let incident = state.store.create(draft).await;
    Ok((StatusCode::CREATED, Json(incident)))
}

async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    submission: IncidentSubmission,
) -> Result<Json<Incident>, ApiError> {
    let (draft, upload) = submission.validate().await?;
    match state.store.update(&id, draft).await {
        Some(incident) => Ok(Json(incident)),
        None => {
            if let Some(upload) = upload {
                upload.discard().await;
            }
            Err(ApiError::NotFound)
        }
    }
}

async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete(&id).await {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "message": "Incident deleted successfully" })))
}

async fn health_handler() -> Json<HealthReport> {
    tracing::info!("Health check requested");
    Json(HealthReport::now())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
