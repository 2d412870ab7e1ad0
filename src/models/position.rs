use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderId;
use crate::models::partner::PartnerId;

/// One immutable reading from a partner. Never updated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub id: i64,
    pub partner_id: PartnerId,
    pub order_id: Option<OrderId>,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}
