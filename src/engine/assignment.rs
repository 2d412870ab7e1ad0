use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::auth::Session;
use crate::engine::orders::notify_status;
use crate::error::AppError;
use crate::models::order::{Order, OrderId};
use crate::models::partner::PartnerId;
use crate::models::vendor::VendorId;
use crate::state::AppState;
use crate::store::{AssignOutcome, Store};

/// Binds `partner_id` to a pending order of `actor_vendor_id`.
///
/// The write is one conditional update on the order row. When two callers
/// race for the same pending order exactly one gets `Ok`; the other gets
/// `Conflict` and changes nothing.
pub fn assign(
    store: &Store,
    order_id: OrderId,
    partner_id: PartnerId,
    actor_vendor_id: VendorId,
    estimated_delivery_after: Duration,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let order = store
        .order(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.vendor_id != actor_vendor_id {
        return Err(AppError::Unauthorized(format!(
            "order {order_id} belongs to another vendor"
        )));
    }

    // Flat offset, not derived from distance.
    let estimated_delivery_at = now
        .checked_add_signed(estimated_delivery_after)
        .ok_or_else(|| AppError::Internal("estimated delivery time out of range".to_string()))?;

    match store.assign_if_pending(order_id, partner_id, estimated_delivery_at, now) {
        AssignOutcome::Assigned(order) => Ok(order),
        AssignOutcome::OrderMissing => Err(AppError::NotFound(format!("order {order_id} not found"))),
        AssignOutcome::PartnerMissing => Err(AppError::NotFound(format!(
            "partner {partner_id} not found"
        ))),
        AssignOutcome::PartnerOffline => Err(AppError::Conflict(format!(
            "partner {partner_id} is offline"
        ))),
        AssignOutcome::NotPending(status) => Err(AppError::Conflict(format!(
            "order {order_id} is {status}, only pending orders can be assigned"
        ))),
    }
}

/// Vendor-initiated assignment with metrics, logging and party notification.
pub fn assign_partner(
    state: &AppState,
    session: &Session,
    order_id: OrderId,
    partner_id: PartnerId,
) -> Result<Order, AppError> {
    let start = Instant::now();
    let vendor_id = session.require_vendor()?;

    let result = Duration::try_minutes(state.config.estimated_delivery_minutes)
        .ok_or_else(|| AppError::Internal("estimated delivery offset out of range".to_string()))
        .and_then(|offset| {
            assign(&state.store, order_id, partner_id, vendor_id, offset, Utc::now())
        });

    let outcome = match &result {
        Ok(_) => "assigned",
        Err(AppError::Conflict(_)) => "conflict",
        Err(AppError::NotFound(_)) => "not_found",
        Err(AppError::Unauthorized(_)) => "unauthorized",
        Err(_) => "error",
    };
    let elapsed = start.elapsed().as_secs_f64();
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    match &result {
        Ok(order) => {
            info!(
                order_id,
                partner_id,
                vendor_id,
                order_number = %order.order_number,
                "order assigned"
            );
            notify_status(state, order);
        }
        Err(err) => warn!(order_id, partner_id, vendor_id, error = %err, "assignment rejected"),
    }

    result
}
