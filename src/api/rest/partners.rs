use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::auth::Session;
use crate::engine::tracking;
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::order::OrderId;
use crate::models::partner::{PartnerId, PartnerProfile};
use crate::models::position::PositionSample;
use crate::realtime::protocol::{AvailabilityBroadcast, ServerEvent};
use crate::realtime::registry::Channel;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/partners/available", get(list_available))
        .route("/partners/me/status", patch(update_status))
        .route("/partners/me/location", post(submit_location))
        .route("/partners/:id/location", get(latest_location))
        .route("/partners/:id/history", get(location_history))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub online: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub order_id: Option<OrderId>,
}

async fn list_available(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<PartnerProfile>>, AppError> {
    session.require_role(Role::Vendor)?;
    Ok(Json(state.store.online_partners()))
}

/// Only the partner's own session toggles its availability.
async fn update_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<PartnerProfile>, AppError> {
    let partner_id = session.require_partner()?;
    let now = Utc::now();

    let partner = state
        .store
        .set_partner_online(partner_id, payload.online, now)
        .ok_or_else(|| AppError::NotFound(format!("partner {partner_id} not found")))?;

    info!(partner_id, online = partner.online, "partner availability changed");

    let event = ServerEvent::PartnerAvailabilityChanged(AvailabilityBroadcast {
        partner_id,
        online: partner.online,
        timestamp: now,
    });
    state.broadcaster.publish(Channel::Role(Role::Vendor), &event);

    Ok(Json(partner))
}

async fn submit_location(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<SubmitLocationRequest>,
) -> Result<Json<PositionSample>, AppError> {
    let sample = tracking::report_position(
        &state,
        &session,
        payload.latitude,
        payload.longitude,
        payload.order_id,
    )?;
    Ok(Json(sample))
}

async fn latest_location(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<PartnerId>,
) -> Result<Json<PositionSample>, AppError> {
    tracking::latest_position(&state, &session, id).map(Json)
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<PartnerId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PositionSample>>, AppError> {
    tracking::position_history(&state, &session, id, query.order_id).map(Json)
}
