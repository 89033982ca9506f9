use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, MutexGuard};
use std::time::Instant;

use crate::acquisition::Snapshot;
use crate::location::{AcquisitionError, Coordinate};
use crate::session::StartOutcome;
use crate::store::{Category, LocationStore, NewLocation, StoreError, TaggedLocation};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::UnknownCategory(_) | StoreError::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Io { .. } | StoreError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e.to_string())
    }
}

impl From<AcquisitionError> for ApiError {
    fn from(e: AcquisitionError) -> Self {
        let status = match e {
            AcquisitionError::Denied | AcquisitionError::ServicesDisabled => StatusCode::FORBIDDEN,
            AcquisitionError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e.to_string())
    }
}

fn store(state: &AppState) -> MutexGuard<'_, LocationStore> {
    state.store.lock().unwrap_or_else(|e| e.into_inner())
}

fn log_request(route: &str, outcome: impl std::fmt::Display, start: Instant) {
    log::info!(
        "{} -> {} ({:.1}ms)",
        route,
        outcome,
        start.elapsed().as_secs_f64() * 1000.0,
    );
}

// ─── Acquisition ─────────────────────────────────────────────────

pub async fn acquisition(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    let start = Instant::now();
    let snapshot = state.session.snapshot();
    log_request("GET /api/acquisition", format!("{:?}", snapshot.status), start);
    Json(snapshot)
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub outcome: StartOutcome,
    pub snapshot: Snapshot,
}

pub async fn toggle(State(state): State<Arc<AppState>>) -> Result<Json<ToggleResponse>, ApiError> {
    let start = Instant::now();
    let outcome = state.session.toggle().await?;
    log_request("POST /api/acquisition/toggle", format!("{:?}", outcome), start);
    Ok(Json(ToggleResponse {
        outcome,
        snapshot: state.session.snapshot(),
    }))
}

#[derive(Serialize)]
pub struct StopResponse {
    pub stopped: bool,
    pub snapshot: Snapshot,
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let start = Instant::now();
    let stopped = state.session.stop().await;
    log_request("POST /api/acquisition/stop", stopped, start);
    Json(StopResponse {
        stopped,
        snapshot: state.session.snapshot(),
    })
}

// ─── Categories ──────────────────────────────────────────────────

pub async fn categories() -> Json<Vec<Category>> {
    Json(Category::ALL.to_vec())
}

// ─── Tagged locations ────────────────────────────────────────────

pub async fn list_locations(State(state): State<Arc<AppState>>) -> Json<Vec<TaggedLocation>> {
    let start = Instant::now();
    let all = store(&state).list().to_vec();
    log_request("GET /api/locations", all.len(), start);
    Json(all)
}

pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<TaggedLocation>, ApiError> {
    let start = Instant::now();
    let found = store(&state).get(id).cloned();
    log_request("GET /api/locations/{id}", if found.is_some() { "found" } else { "not found" }, start);
    found.map(Json).ok_or_else(|| StoreError::NotFound(id).into())
}

#[derive(Debug, Default, Deserialize)]
pub struct TagRequest {
    pub category: Option<String>,
    pub description: Option<String>,
    /// Explicit coordinates; defaults to the current acquisition result.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn tag_location(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TagRequest>,
) -> Result<(StatusCode, Json<TaggedLocation>), ApiError> {
    let start = Instant::now();

    let category = match req.category.as_deref() {
        Some(c) => c.parse::<Category>()?,
        None => Category::default(),
    };

    let (coordinate, placemark) = match (req.latitude, req.longitude) {
        (Some(lat), Some(lon)) => (Coordinate { lat, lon }, None),
        (None, None) => {
            let snapshot = state.session.snapshot();
            let reading = snapshot
                .location
                .ok_or_else(|| api_error(StatusCode::CONFLICT, "No location acquired yet"))?;
            (reading.coordinate(), snapshot.placemark)
        }
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Provide both 'latitude' and 'longitude' or neither",
            ))
        }
    };

    let saved = store(&state).tag(NewLocation {
        coordinate,
        placemark,
        category,
        description: req.description.unwrap_or_default(),
    })?;

    log_request("POST /api/locations", saved.id, start);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn remove_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<TaggedLocation>, ApiError> {
    let start = Instant::now();
    let removed = store(&state).remove(id)?;
    log_request("DELETE /api/locations", id, start);
    Ok(Json(removed))
}
