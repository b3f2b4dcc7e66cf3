use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::dto::{
    MemberZoneResponse, SetZoneRequest, ZoneListResponse, ZoneStatsResponse,
};
use super::format::parse_zone;
use super::services::{label_groups, with_deadline, CallError};
use super::store::StoreError;
use crate::state::AppState;

// --- public routers ---

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/communities/:community_id/members/:member_id/zone",
            get(get_zone).put(set_zone).delete(remove_zone),
        )
        .route(
            "/communities/:community_id/members/:member_id/activity",
            post(touch_activity),
        )
}

pub fn community_routes() -> Router<AppState> {
    Router::new()
        .route("/communities/:community_id/zones", get(list_zones))
        .route("/stats/zones", get(zone_stats))
}

// --- handlers ---

#[instrument(skip(state, body))]
pub async fn set_zone(
    State(state): State<AppState>,
    Path((community_id, member_id)): Path<(i64, i64)>,
    Json(body): Json<SetZoneRequest>,
) -> Result<Json<MemberZoneResponse>, (StatusCode, String)> {
    let tz = parse_zone(&body.zone).map_err(|e| {
        warn!(error = %e, "rejected timezone");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    let zone = tz.name();

    with_deadline(
        state.config.store_timeout(),
        state.store.upsert_record(community_id, member_id, zone),
    )
    .await
    .map_err(store_failure)?;

    info!(community_id, member_id, zone, "timezone set");
    Ok(Json(MemberZoneResponse {
        zone: zone.to_string(),
        label: state.formatter.format(zone),
    }))
}

#[instrument(skip(state))]
pub async fn get_zone(
    State(state): State<AppState>,
    Path((community_id, member_id)): Path<(i64, i64)>,
) -> Result<Json<MemberZoneResponse>, (StatusCode, String)> {
    let zone = with_deadline(
        state.config.store_timeout(),
        state.store.get_one(community_id, member_id),
    )
    .await
    .map_err(store_failure)?
    .ok_or((StatusCode::NOT_FOUND, "No timezone set".to_string()))?;

    Ok(Json(MemberZoneResponse {
        label: state.formatter.format(&zone),
        zone,
    }))
}

#[instrument(skip(state))]
pub async fn remove_zone(
    State(state): State<AppState>,
    Path((community_id, member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    with_deadline(
        state.config.store_timeout(),
        state.store.delete_record(community_id, member_id),
    )
    .await
    .map_err(store_failure)?;
    info!(community_id, member_id, "timezone removed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn touch_activity(
    State(state): State<AppState>,
    Path((community_id, member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    with_deadline(
        state.config.store_timeout(),
        state.store.record_activity(community_id, member_id),
    )
    .await
    .map_err(store_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Groups come back in the store's (shuffled) order; do not sort here.
#[instrument(skip(state))]
pub async fn list_zones(
    State(state): State<AppState>,
    Path(community_id): Path<i64>,
) -> Result<Json<ZoneListResponse>, (StatusCode, String)> {
    let groups = with_deadline(
        state.config.store_timeout(),
        state.store.get_aggregated(community_id),
    )
    .await
    .map_err(store_failure)?;

    Ok(Json(ZoneListResponse {
        groups: label_groups(groups, state.formatter.as_ref()),
    }))
}

#[instrument(skip(state))]
pub async fn zone_stats(
    State(state): State<AppState>,
) -> Result<Json<ZoneStatsResponse>, (StatusCode, String)> {
    let distinct_zones = with_deadline(
        state.config.store_timeout(),
        state.store.get_zone_cardinality(),
    )
    .await
    .map_err(store_failure)?;
    Ok(Json(ZoneStatsResponse { distinct_zones }))
}

fn store_failure(e: CallError) -> (StatusCode, String) {
    let status = match &e {
        CallError::DeadlineExceeded(_) | CallError::Store(StoreError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CallError::Store(StoreError::ConstraintViolation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        CallError::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %e, %status, "timezone store call failed");
    (status, e.to_string())
}
