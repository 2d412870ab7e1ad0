//! Inbound event dispatch for an admitted connection.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Session;
use crate::engine::{orders, tracking};
use crate::error::AppError;
use crate::models::account::Role;
use crate::realtime::protocol::{
    Envelope, ErrorPayload, LOCATION_UPDATE, LocationAck, LocationUpdate, ORDER_STATUS_UPDATE,
    OrderStatusUpdate, ServerEvent, StatusBroadcast,
};
use crate::state::AppState;

/// Handles one text frame and returns the reply for the originating
/// connection, if any. Fan-out to other parties happens inside the handlers.
pub fn handle_frame(state: &AppState, session: &Session, text: &str) -> Option<ServerEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(account_id = session.account_id, error = %err, "malformed frame");
            return Some(ServerEvent::error(format!("malformed frame: {err}")));
        }
    };

    match envelope.event.as_str() {
        LOCATION_UPDATE => on_location_update(state, session, envelope.data),
        ORDER_STATUS_UPDATE => Some(on_order_status_update(state, session, envelope.data)),
        other => Some(ServerEvent::error(format!("unknown event: {other}"))),
    }
}

fn on_location_update(state: &AppState, session: &Session, data: Value) -> Option<ServerEvent> {
    if session.role != Role::Delivery {
        debug!(
            account_id = session.account_id,
            role = %session.role,
            "ignoring location_update from non-partner connection"
        );
        return None;
    }

    let result = payload::<LocationUpdate>(LOCATION_UPDATE, data).and_then(|update| {
        tracking::report_position(
            state,
            session,
            update.latitude,
            update.longitude,
            update.order_id,
        )
    });

    Some(match result {
        Ok(sample) => ServerEvent::LocationUpdateSuccess(LocationAck::from(&sample)),
        Err(err) => {
            warn!(account_id = session.account_id, error = %err, "location_update failed");
            ServerEvent::LocationUpdateError(error_payload(&err))
        }
    })
}

fn on_order_status_update(state: &AppState, session: &Session, data: Value) -> ServerEvent {
    let result = payload::<OrderStatusUpdate>(ORDER_STATUS_UPDATE, data)
        .and_then(|update| orders::change_status(state, session, update.order_id, update.status));

    match result {
        Ok(order) => ServerEvent::OrderStatusUpdateSuccess(StatusBroadcast::from(&order)),
        Err(err) => {
            warn!(account_id = session.account_id, error = %err, "order_status_update failed");
            ServerEvent::OrderStatusUpdateError(error_payload(&err))
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|err| AppError::Validation(format!("invalid {event} payload: {err}")))
}

fn error_payload(err: &AppError) -> ErrorPayload {
    ErrorPayload {
        message: err.message().to_string(),
    }
}
