use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Session;
use crate::error::AppError;
use crate::models::account::{Account, Role};
use crate::models::partner::{PartnerProfile, VehicleType};
use crate::models::vendor::VendorProfile;
use crate::store::{NewAccount, NewVendor};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/me", get(me))
        .route("/vendors", post(create_vendor))
        .route("/partners", post(create_partner))
}

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct CreateAccountResponse {
    pub account: Account,
    pub token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVendorRequest {
    pub business_name: String,
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartnerRequest {
    pub vehicle_type: VehicleType,
}

/// Bootstrap: creates an account and hands back a bearer token for it.
async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<Json<CreateAccountResponse>, AppError> {
    if !payload.email.contains('@') {
        return Err(AppError::Validation("email is invalid".to_string()));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    let role: Role = payload.role.parse()?;

    let account = state.store.insert_account(
        NewAccount {
            email: payload.email,
            name: payload.name.trim().to_string(),
            role,
        },
        Utc::now(),
    )?;
    let token = state.authenticator.issue(&account)?;

    info!(account_id = account.id, role = %account.role, "account created");
    Ok(Json(CreateAccountResponse { account, token }))
}

async fn me(session: Session) -> Json<Session> {
    Json(session)
}

async fn create_vendor(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CreateVendorRequest>,
) -> Result<Json<VendorProfile>, AppError> {
    session.require_role(Role::Vendor)?;

    if payload.business_name.trim().is_empty() {
        return Err(AppError::Validation("businessName cannot be empty".to_string()));
    }
    if payload.address.trim().is_empty() {
        return Err(AppError::Validation("address cannot be empty".to_string()));
    }

    let vendor = state.store.insert_vendor(
        session.account_id,
        NewVendor {
            business_name: payload.business_name,
            address: payload.address,
            phone: payload.phone,
        },
        Utc::now(),
    )?;

    info!(vendor_id = vendor.id, account_id = session.account_id, "vendor profile created");
    Ok(Json(vendor))
}

async fn create_partner(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CreatePartnerRequest>,
) -> Result<Json<PartnerProfile>, AppError> {
    session.require_role(Role::Delivery)?;

    let partner = state
        .store
        .insert_partner(session.account_id, payload.vehicle_type, Utc::now())?;

    info!(partner_id = partner.id, account_id = session.account_id, "partner profile created");
    Ok(Json(partner))
}
