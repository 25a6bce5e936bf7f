/**
 * API REST FLEETWATCH - Surface HTTP minimale du kernel
 *
 * RÔLE :
 * Expose l'agrégation santé de la flotte au dashboard : liste des navires avec
 * leur score, détail d'un navire, et déclenchement du backfill capteurs.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, réponses JSON
 * - Échec global du store -> 500 avec message générique, timeout -> 504
 * - Un seul backfill à la fois (409 sinon)
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::error;

use crate::backfill::{BackfillReport, SensorLinkBackfill};
use crate::models::{VesselDetail, VesselHealthSummary, VesselId};
use crate::state::{new_slot, Shared};
use crate::summary::{FleetHealthService, ListingError};

#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetHealthService>,
    pub backfill: Arc<SensorLinkBackfill>,
    pub backfill_slot: Shared<BackfillReport>,
}

impl AppState {
    pub fn new(fleet: FleetHealthService, backfill: SensorLinkBackfill) -> Self {
        Self {
            fleet: Arc::new(fleet),
            backfill: Arc::new(backfill),
            backfill_slot: new_slot(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    Conflict(&'static str),
    Timeout,
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Request timed out"),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

fn listing_failure(e: ListingError, what: &'static str) -> ApiError {
    error!(error = %e, "[http] {what}");
    match e {
        ListingError::Timeout(_) => ApiError::Timeout,
        ListingError::Store(_) => ApiError::Internal(what),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/vessels", get(list_vessels))
        .route("/api/vessels/{id}", get(get_vessel))
        .route(
            "/api/maintenance/sensor-links",
            get(last_backfill).post(run_backfill),
        )
        .with_state(app_state)
}

// GET /api/vessels (liste + score santé)
async fn list_vessels(State(app): State<AppState>) -> Result<Json<Vec<VesselHealthSummary>>, ApiError> {
    let list = app
        .fleet
        .list()
        .await
        .map_err(|e| listing_failure(e, "Failed to load vessels"))?;
    Ok(Json(list))
}

// GET /api/vessels/{id} (détail + capteurs)
async fn get_vessel(
    State(app): State<AppState>,
    Path(id): Path<VesselId>,
) -> Result<Json<VesselDetail>, ApiError> {
    match app.fleet.vessel_detail(id).await {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(ApiError::NotFound("Vessel not found")),
        Err(e) => Err(listing_failure(e, "Failed to load vessel")),
    }
}

// POST /api/maintenance/sensor-links (lance le backfill, bloquant jusqu'à la fin)
async fn run_backfill(State(app): State<AppState>) -> Result<Json<BackfillReport>, ApiError> {
    let Some(ticket) = app.backfill_slot.try_begin() else {
        return Err(ApiError::Conflict("Backfill already running"));
    };
    match app.backfill.run().await {
        Ok(report) => {
            ticket.finish(report.clone());
            Ok(Json(report))
        }
        Err(e) => {
            error!(error = %e, "[http] backfill failed");
            Err(ApiError::Internal("Backfill failed"))
        }
    }
}

// GET /api/maintenance/sensor-links (dernier rapport)
async fn last_backfill(State(app): State<AppState>) -> Result<Json<BackfillReport>, ApiError> {
    app.backfill_slot
        .last()
        .map(Json)
        .ok_or(ApiError::NotFound("No backfill has completed yet"))
}
