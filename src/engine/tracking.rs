use tracing::debug;

use crate::auth::Session;
use crate::engine::ledger::LocationLedger;
use crate::engine::orders::Audience;
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::order::OrderId;
use crate::models::partner::PartnerId;
use crate::models::position::PositionSample;
use crate::realtime::protocol::{LocationBroadcast, ServerEvent};
use crate::state::AppState;

/// Records a sample from the session's partner and, when it is tagged with an
/// order, publishes it to that order's customer and vendor.
pub fn report_position(
    state: &AppState,
    session: &Session,
    latitude: f64,
    longitude: f64,
    order_id: Option<OrderId>,
) -> Result<PositionSample, AppError> {
    let partner_id = session.require_partner()?;

    let order = match order_id {
        Some(order_id) => {
            let order = state
                .store
                .order(order_id)
                .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
            if order.partner_id != Some(partner_id) {
                return Err(AppError::Unauthorized(format!(
                    "partner {partner_id} is not assigned to order {order_id}"
                )));
            }
            if order.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "order {order_id} is {} and no longer tracked",
                    order.status
                )));
            }
            Some(order)
        }
        None => None,
    };

    let sample = LocationLedger::new(&state.store).record(partner_id, latitude, longitude, order_id)?;
    state.metrics.position_samples_total.inc();

    if let Some(order) = order {
        let audience = Audience::of(&state.store, &order);
        let event = ServerEvent::DeliveryLocationUpdate(LocationBroadcast {
            order_id: order.id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp: sample.recorded_at,
        });
        let delivered = state
            .broadcaster
            .publish_to_identities(&audience.customer_and_vendor(), &event);
        debug!(partner_id, order_id = order.id, delivered, "position broadcast");
    }

    Ok(sample)
}

/// The partner itself, or a customer or vendor with an order assigned to it.
pub fn authorize_reader(
    state: &AppState,
    session: &Session,
    partner_id: PartnerId,
) -> Result<(), AppError> {
    if state.store.partner(partner_id).is_none() {
        return Err(AppError::NotFound(format!("partner {partner_id} not found")));
    }

    let permitted = match session.role {
        Role::Delivery => session.partner_id == Some(partner_id),
        Role::Customer => state.store.any_order(|order| {
            order.partner_id == Some(partner_id) && order.customer_id == session.account_id
        }),
        Role::Vendor => session.vendor_id.is_some_and(|vendor_id| {
            state.store.any_order(|order| {
                order.partner_id == Some(partner_id) && order.vendor_id == vendor_id
            })
        }),
    };

    if permitted {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "no access to partner {partner_id} location"
        )))
    }
}

pub fn latest_position(
    state: &AppState,
    session: &Session,
    partner_id: PartnerId,
) -> Result<PositionSample, AppError> {
    authorize_reader(state, session, partner_id)?;
    LocationLedger::new(&state.store)
        .latest(partner_id)
        .ok_or_else(|| AppError::NotFound(format!("no position recorded for partner {partner_id}")))
}

pub fn position_history(
    state: &AppState,
    session: &Session,
    partner_id: PartnerId,
    order_id: Option<OrderId>,
) -> Result<Vec<PositionSample>, AppError> {
    authorize_reader(state, session, partner_id)?;
    Ok(LocationLedger::new(&state.store).history(partner_id, order_id))
}
