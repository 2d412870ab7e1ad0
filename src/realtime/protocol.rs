//! Websocket wire format: `{"event": <name>, "data": <payload>}` text frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::account::{AccountId, Role};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::partner::PartnerId;
use crate::models::position::PositionSample;

pub const LOCATION_UPDATE: &str = "location_update";
pub const ORDER_STATUS_UPDATE: &str = "order_status_update";

/// An inbound frame before its payload is interpreted.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    DeliveryLocationUpdate(LocationBroadcast),
    OrderStatusChanged(StatusBroadcast),
    LocationUpdateSuccess(LocationAck),
    LocationUpdateError(ErrorPayload),
    OrderStatusUpdateSuccess(StatusBroadcast),
    OrderStatusUpdateError(ErrorPayload),
    OrderCreated(Order),
    PartnerAvailabilityChanged(AvailabilityBroadcast),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::DeliveryLocationUpdate(_) => "delivery_location_update",
            ServerEvent::OrderStatusChanged(_) => "order_status_changed",
            ServerEvent::LocationUpdateSuccess(_) => "location_update_success",
            ServerEvent::LocationUpdateError(_) => "location_update_error",
            ServerEvent::OrderStatusUpdateSuccess(_) => "order_status_update_success",
            ServerEvent::OrderStatusUpdateError(_) => "order_status_update_error",
            ServerEvent::OrderCreated(_) => "order_created",
            ServerEvent::PartnerAvailabilityChanged(_) => "partner_availability_changed",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub account_id: AccountId,
    pub role: Role,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBroadcast {
    pub order_id: OrderId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBroadcast {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<&Order> for StatusBroadcast {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            timestamp: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAck {
    pub partner_id: PartnerId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub timestamp: DateTime<Utc>,
}

impl From<&PositionSample> for LocationAck {
    fn from(sample: &PositionSample) -> Self {
        Self {
            partner_id: sample.partner_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            order_id: sample.order_id,
            timestamp: sample.recorded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityBroadcast {
    pub partner_id: PartnerId,
    pub online: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
