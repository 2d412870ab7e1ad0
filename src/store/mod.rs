//! In-memory row store.
//!
//! Every table is a sharded `DashMap`. Conditional writes run under the
//! row's shard lock, which is the only thing that serializes competing
//! writers of the same order. Lock order when two rows are involved:
//! partner row before order row, partner row before its sample log.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::engine::lifecycle::Transition;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::account::{Account, AccountId, Role};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::partner::{INITIAL_RATING, PartnerId, PartnerProfile, VehicleType};
use crate::models::position::PositionSample;
use crate::models::vendor::{VendorId, VendorProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileRef {
    Vendor(VendorId),
    Partner(PartnerId),
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewVendor {
    pub business_name: String,
    pub address: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: AccountId,
    pub vendor_id: VendorId,
    pub pickup_address: String,
    pub delivery_address: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned(Order),
    OrderMissing,
    PartnerMissing,
    PartnerOffline,
    NotPending(OrderStatus),
}

#[derive(Debug, Clone)]
pub enum StatusWrite {
    Applied(Order),
    Missing,
    /// The row no longer holds the status the transition was computed from.
    Stale(OrderStatus),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableCounts {
    pub accounts: usize,
    pub vendors: usize,
    pub partners: usize,
    pub orders: usize,
}

#[derive(Default)]
struct Sequence(AtomicI64);

impl Sequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Default)]
pub struct Store {
    accounts: DashMap<AccountId, Account>,
    account_emails: DashMap<String, AccountId>,
    profile_owners: DashMap<AccountId, ProfileRef>,
    vendors: DashMap<VendorId, VendorProfile>,
    partners: DashMap<PartnerId, PartnerProfile>,
    orders: DashMap<OrderId, Order>,
    order_numbers: DashMap<String, OrderId>,
    positions: DashMap<PartnerId, Vec<PositionSample>>,
    account_seq: Sequence,
    vendor_seq: Sequence,
    partner_seq: Sequence,
    order_seq: Sequence,
    position_seq: Sequence,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            accounts: self.accounts.len(),
            vendors: self.vendors.len(),
            partners: self.partners.len(),
            orders: self.orders.len(),
        }
    }

    pub fn insert_account(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, AppError> {
        let email = new.email.trim().to_lowercase();

        match self.account_emails.entry(email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "account with email {email} already exists"
            ))),
            Entry::Vacant(slot) => {
                let account = Account {
                    id: self.account_seq.next(),
                    email,
                    name: new.name,
                    role: new.role,
                    active: true,
                    created_at: now,
                };
                self.accounts.insert(account.id, account.clone());
                slot.insert(account.id);
                Ok(account)
            }
        }
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn set_account_active(&self, id: AccountId, active: bool) -> Option<Account> {
        let mut account = self.accounts.get_mut(&id)?;
        account.active = active;
        Some(account.clone())
    }

    pub fn insert_vendor(
        &self,
        account_id: AccountId,
        new: NewVendor,
        now: DateTime<Utc>,
    ) -> Result<VendorProfile, AppError> {
        match self.profile_owners.entry(account_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "account {account_id} already owns a profile"
            ))),
            Entry::Vacant(slot) => {
                let vendor = VendorProfile {
                    id: self.vendor_seq.next(),
                    account_id,
                    business_name: new.business_name,
                    address: new.address,
                    phone: new.phone,
                    created_at: now,
                };
                self.vendors.insert(vendor.id, vendor.clone());
                slot.insert(ProfileRef::Vendor(vendor.id));
                Ok(vendor)
            }
        }
    }

    pub fn vendor(&self, id: VendorId) -> Option<VendorProfile> {
        self.vendors.get(&id).map(|entry| entry.value().clone())
    }

    pub fn vendor_for_account(&self, account_id: AccountId) -> Option<VendorId> {
        match self.profile_owners.get(&account_id).map(|entry| *entry.value()) {
            Some(ProfileRef::Vendor(id)) => Some(id),
            _ => None,
        }
    }

    pub fn insert_partner(
        &self,
        account_id: AccountId,
        vehicle_type: VehicleType,
        now: DateTime<Utc>,
    ) -> Result<PartnerProfile, AppError> {
        match self.profile_owners.entry(account_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "account {account_id} already owns a profile"
            ))),
            Entry::Vacant(slot) => {
                let partner = PartnerProfile {
                    id: self.partner_seq.next(),
                    account_id,
                    vehicle_type,
                    online: false,
                    current_position: None,
                    last_position_at: None,
                    total_deliveries: 0,
                    rating: INITIAL_RATING,
                    created_at: now,
                    updated_at: now,
                };
                self.partners.insert(partner.id, partner.clone());
                slot.insert(ProfileRef::Partner(partner.id));
                Ok(partner)
            }
        }
    }

    pub fn partner(&self, id: PartnerId) -> Option<PartnerProfile> {
        self.partners.get(&id).map(|entry| entry.value().clone())
    }

    pub fn partner_for_account(&self, account_id: AccountId) -> Option<PartnerId> {
        match self.profile_owners.get(&account_id).map(|entry| *entry.value()) {
            Some(ProfileRef::Partner(id)) => Some(id),
            _ => None,
        }
    }

    pub fn set_partner_online(
        &self,
        id: PartnerId,
        online: bool,
        now: DateTime<Utc>,
    ) -> Option<PartnerProfile> {
        let mut partner = self.partners.get_mut(&id)?;
        partner.online = online;
        partner.updated_at = now;
        Some(partner.clone())
    }

    pub fn online_partners(&self) -> Vec<PartnerProfile> {
        let mut partners: Vec<PartnerProfile> = self
            .partners
            .iter()
            .filter(|entry| entry.value().online)
            .map(|entry| entry.value().clone())
            .collect();
        partners.sort_by_key(|partner| partner.id);
        partners
    }

    pub fn increment_deliveries(&self, id: PartnerId, now: DateTime<Utc>) {
        if let Some(mut partner) = self.partners.get_mut(&id) {
            partner.total_deliveries = partner.total_deliveries.saturating_add(1);
            partner.updated_at = now;
        }
    }

    /// Inserts a pending order under a freshly generated, unique order number.
    pub fn insert_order(&self, new: NewOrder, now: DateTime<Utc>) -> Order {
        loop {
            let order_number = generate_order_number(now);
            let Entry::Vacant(slot) = self.order_numbers.entry(order_number.clone()) else {
                continue;
            };

            let order = Order {
                id: self.order_seq.next(),
                order_number,
                customer_id: new.customer_id,
                vendor_id: new.vendor_id,
                partner_id: None,
                status: OrderStatus::Pending,
                pickup_address: new.pickup_address,
                delivery_address: new.delivery_address,
                total_amount: new.total_amount,
                created_at: now,
                updated_at: now,
                estimated_delivery_at: None,
                delivered_at: None,
            };
            self.orders.insert(order.id, order.clone());
            slot.insert(order.id);
            return order;
        }
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    pub fn order_by_number(&self, order_number: &str) -> Option<Order> {
        let id = *self.order_numbers.get(order_number)?.value();
        self.order(id)
    }

    /// Orders satisfying `predicate`, newest first.
    pub fn orders_where<F>(&self, predicate: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }

    pub fn any_order<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Order) -> bool,
    {
        self.orders.iter().any(|entry| predicate(entry.value()))
    }

    /// `UPDATE orders SET status = 'assigned', partner_id = ?, ...
    ///  WHERE id = ? AND status = 'pending'`, with the partner row held so it
    /// cannot go offline between the check and the write.
    pub fn assign_if_pending(
        &self,
        order_id: OrderId,
        partner_id: PartnerId,
        estimated_delivery_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AssignOutcome {
        let Some(partner) = self.partners.get(&partner_id) else {
            return AssignOutcome::PartnerMissing;
        };
        if !partner.online {
            return AssignOutcome::PartnerOffline;
        }

        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return AssignOutcome::OrderMissing;
        };
        if order.status != OrderStatus::Pending {
            return AssignOutcome::NotPending(order.status);
        }

        order.status = OrderStatus::Assigned;
        order.partner_id = Some(partner_id);
        order.estimated_delivery_at = Some(estimated_delivery_at);
        order.updated_at = now;

        AssignOutcome::Assigned(order.clone())
    }

    /// Writes `transition` only if the row still holds `transition.from`.
    pub fn apply_transition(
        &self,
        order_id: OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> StatusWrite {
        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return StatusWrite::Missing;
        };
        if order.status != transition.from {
            return StatusWrite::Stale(order.status);
        }

        order.status = transition.to;
        order.updated_at = now;
        if transition.stamps_delivery {
            order.delivered_at = Some(now);
        }

        StatusWrite::Applied(order.clone())
    }

    /// Appends a sample and overwrites the partner's latest position.
    /// Returns `None` if the partner does not exist.
    pub fn record_position(
        &self,
        partner_id: PartnerId,
        point: GeoPoint,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Option<PositionSample> {
        let mut partner = self.partners.get_mut(&partner_id)?;

        // Keep per-partner timestamps strictly increasing.
        let recorded_at = match partner.last_position_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };

        let sample = PositionSample {
            id: self.position_seq.next(),
            partner_id,
            order_id,
            latitude: point.latitude,
            longitude: point.longitude,
            recorded_at,
        };

        self.positions
            .entry(partner_id)
            .or_default()
            .push(sample.clone());

        partner.current_position = Some(point);
        partner.last_position_at = Some(recorded_at);
        partner.updated_at = now;

        Some(sample)
    }

    pub fn latest_position(&self, partner_id: PartnerId) -> Option<PositionSample> {
        self.positions
            .get(&partner_id)
            .and_then(|samples| samples.last().cloned())
    }

    /// Samples of a partner, newest first, optionally restricted to one order.
    pub fn positions(&self, partner_id: PartnerId, order_id: Option<OrderId>) -> Vec<PositionSample> {
        let Some(samples) = self.positions.get(&partner_id) else {
            return Vec::new();
        };

        samples
            .iter()
            .rev()
            .filter(|sample| order_id.is_none() || sample.order_id == order_id)
            .cloned()
            .collect()
    }
}

fn generate_order_number(now: DateTime<Utc>) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        now.format("%Y%m%d"),
        entropy[..8].to_uppercase()
    )
}
