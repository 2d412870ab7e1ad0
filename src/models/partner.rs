use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::account::AccountId;

pub type PartnerId = i64;

pub const INITIAL_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
    Van,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerProfile {
    pub id: PartnerId,
    pub account_id: AccountId,
    pub vehicle_type: VehicleType,
    pub online: bool,
    pub current_position: Option<GeoPoint>,
    pub last_position_at: Option<DateTime<Utc>>,
    pub total_deliveries: u32,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
