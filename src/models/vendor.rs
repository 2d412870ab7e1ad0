use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::account::AccountId;

pub type VendorId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProfile {
    pub id: VendorId,
    pub account_id: AccountId,
    pub business_name: String,
    pub address: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}
