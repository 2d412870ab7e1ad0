use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::auth::Session;
use crate::engine::assignment::assign_partner;
use crate::engine::orders::{self, Audience};
use crate::error::AppError;
use crate::models::account::{AccountId, Role};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::partner::PartnerId;
use crate::models::vendor::VendorId;
use crate::realtime::protocol::ServerEvent;
use crate::state::AppState;
use crate::store::NewOrder;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/number/:order_number", get(get_order_by_number))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/orders/:id/assign", post(assign_order))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    #[serde(default)]
    pub customer_id: Option<AccountId>,
    pub pickup_address: String,
    pub delivery_address: String,
    pub total_amount: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub partner_id: PartnerId,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.pickup_address.trim().is_empty() || payload.delivery_address.trim().is_empty() {
        return Err(AppError::Validation("addresses cannot be empty".to_string()));
    }
    if !payload.total_amount.is_finite() || payload.total_amount < 0.0 {
        return Err(AppError::Validation(
            "totalAmount must be a non-negative number".to_string(),
        ));
    }

    let (customer_id, vendor_id) = match session.role {
        Role::Customer => {
            if payload.customer_id.is_some_and(|id| id != session.account_id) {
                return Err(AppError::Unauthorized(
                    "customers can only order for themselves".to_string(),
                ));
            }
            let vendor_id = payload
                .vendor_id
                .ok_or_else(|| AppError::Validation("vendorId is required".to_string()))?;
            if state.store.vendor(vendor_id).is_none() {
                return Err(AppError::NotFound(format!("vendor {vendor_id} not found")));
            }
            (session.account_id, vendor_id)
        }
        Role::Vendor => {
            let vendor_id = session.require_vendor()?;
            let customer_id = payload
                .customer_id
                .ok_or_else(|| AppError::Validation("customerId is required".to_string()))?;
            match state.store.account(customer_id) {
                Some(account) if account.role == Role::Customer && account.active => {}
                _ => {
                    return Err(AppError::NotFound(format!(
                        "customer {customer_id} not found"
                    )));
                }
            }
            (customer_id, vendor_id)
        }
        Role::Delivery => {
            return Err(AppError::Unauthorized(
                "delivery partners cannot create orders".to_string(),
            ));
        }
    };

    let order = state.store.insert_order(
        NewOrder {
            customer_id,
            vendor_id,
            pickup_address: payload.pickup_address,
            delivery_address: payload.delivery_address,
            total_amount: payload.total_amount,
        },
        Utc::now(),
    );

    info!(
        order_id = order.id,
        order_number = %order.order_number,
        customer_id,
        vendor_id,
        "order created"
    );

    let audience = Audience::of(&state.store, &order);
    let event = ServerEvent::OrderCreated(order.clone());
    state
        .broadcaster
        .publish_to_identities(&audience.customer_and_vendor(), &event);

    Ok(Json(order))
}

/// Orders the session is related to, newest first.
async fn list_orders(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let matches_status = |order: &Order| status.is_none_or(|status| order.status == status);

    let orders = match session.role {
        Role::Customer => state.store.orders_where(|order| {
            order.customer_id == session.account_id && matches_status(order)
        }),
        Role::Vendor => match session.vendor_id {
            Some(vendor_id) => state
                .store
                .orders_where(|order| order.vendor_id == vendor_id && matches_status(order)),
            None => Vec::new(),
        },
        Role::Delivery => match session.partner_id {
            Some(partner_id) => state.store.orders_where(|order| {
                order.partner_id == Some(partner_id) && matches_status(order)
            }),
            None => Vec::new(),
        },
    };

    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    orders::visible_order(&state, &session, id).map(Json)
}

async fn get_order_by_number(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(order_number): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .store
        .order_by_number(&order_number)
        .ok_or_else(|| AppError::NotFound(format!("order {order_number} not found")))?;

    orders::ensure_party(&session, order).map(Json)
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<OrderId>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let requested: OrderStatus = payload.status.parse()?;
    orders::change_status(&state, &session, id, requested).map(Json)
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<OrderId>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Order>, AppError> {
    assign_partner(&state, &session, id, payload.partner_id).map(Json)
}
