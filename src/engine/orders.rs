use chrono::Utc;
use tracing::{info, warn};

use crate::auth::Session;
use crate::engine::lifecycle::{self, Relation};
use crate::error::AppError;
use crate::models::account::AccountId;
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::realtime::protocol::{ServerEvent, StatusBroadcast};
use crate::state::AppState;
use crate::store::{StatusWrite, Store};

/// Account identities with a legitimate interest in an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Audience {
    pub customer: AccountId,
    pub vendor: Option<AccountId>,
    pub partner: Option<AccountId>,
}

impl Audience {
    pub fn of(store: &Store, order: &Order) -> Self {
        Self {
            customer: order.customer_id,
            vendor: store.vendor(order.vendor_id).map(|vendor| vendor.account_id),
            partner: order
                .partner_id
                .and_then(|id| store.partner(id))
                .map(|partner| partner.account_id),
        }
    }

    pub fn customer_and_vendor(&self) -> Vec<AccountId> {
        std::iter::once(self.customer).chain(self.vendor).collect()
    }

    pub fn everyone(&self) -> Vec<AccountId> {
        std::iter::once(self.customer)
            .chain(self.vendor)
            .chain(self.partner)
            .collect()
    }
}

/// Loads an order the session is a party to.
pub fn visible_order(state: &AppState, session: &Session, order_id: OrderId) -> Result<Order, AppError> {
    let order = state
        .store
        .order(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    ensure_party(session, order)
}

pub fn ensure_party(session: &Session, order: Order) -> Result<Order, AppError> {
    if Relation::of(session, &order).is_party() {
        Ok(order)
    } else {
        Err(AppError::Unauthorized(format!(
            "order {} is not related to this account",
            order.id
        )))
    }
}

/// Applies a state-machine-gated status change and notifies the order's parties.
pub fn change_status(
    state: &AppState,
    session: &Session,
    order_id: OrderId,
    requested: OrderStatus,
) -> Result<Order, AppError> {
    let order = state
        .store
        .order(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let relation = Relation::of(session, &order);
    let transition =
        lifecycle::transition(order.status, requested, session.role, relation).map_err(|denied| {
            warn!(
                order_id,
                account_id = session.account_id,
                from = %order.status,
                to = %requested,
                reason = %denied,
                "status change denied"
            );
            AppError::from(denied)
        })?;

    let now = Utc::now();
    let updated = match state.store.apply_transition(order_id, &transition, now) {
        StatusWrite::Applied(updated) => updated,
        StatusWrite::Missing => {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        }
        StatusWrite::Stale(current) => {
            warn!(order_id, expected = %transition.from, current = %current, "status change lost a race");
            return Err(AppError::Conflict(format!(
                "order {order_id} changed concurrently and is now {current}"
            )));
        }
    };

    if transition.stamps_delivery {
        if let Some(partner_id) = updated.partner_id {
            state.store.increment_deliveries(partner_id, now);
        }
    }

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[updated.status.as_str()])
        .inc();

    info!(
        order_id,
        order_number = %updated.order_number,
        from = %transition.from,
        to = %transition.to,
        account_id = session.account_id,
        "order status changed"
    );

    notify_status(state, &updated);
    Ok(updated)
}

/// Publishes `order_status_changed` to the customer, vendor and assigned partner.
pub fn notify_status(state: &AppState, order: &Order) -> usize {
    let audience = Audience::of(&state.store, order);
    let event = ServerEvent::OrderStatusChanged(StatusBroadcast::from(order));
    state
        .broadcaster
        .publish_to_identities(&audience.everyone(), &event)
}
