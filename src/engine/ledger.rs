//! Append-only position log with a latest-position projection per partner.

use chrono::Utc;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::order::OrderId;
use crate::models::partner::PartnerId;
use crate::models::position::PositionSample;
use crate::store::Store;

pub struct LocationLedger<'a> {
    store: &'a Store,
}

impl<'a> LocationLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Every valid sample is appended; identical consecutive readings are kept.
    pub fn record(
        &self,
        partner_id: PartnerId,
        latitude: f64,
        longitude: f64,
        order_id: Option<OrderId>,
    ) -> Result<PositionSample, AppError> {
        let point = GeoPoint::new(latitude, longitude)?;

        self.store
            .record_position(partner_id, point, order_id, Utc::now())
            .ok_or_else(|| AppError::NotFound(format!("partner {partner_id} not found")))
    }

    pub fn latest(&self, partner_id: PartnerId) -> Option<PositionSample> {
        self.store.latest_position(partner_id)
    }

    pub fn history(&self, partner_id: PartnerId, order_id: Option<OrderId>) -> Vec<PositionSample> {
        self.store.positions(partner_id, order_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::LocationLedger;
    use crate::error::AppError;
    use crate::models::account::Role;
    use crate::models::partner::VehicleType;
    use crate::store::{NewAccount, Store};

    fn partner(store: &Store) -> i64 {
        let account = store
            .insert_account(
                NewAccount {
                    email: "rider@example.com".to_string(),
                    name: "Rider".to_string(),
                    role: Role::Delivery,
                },
                Utc::now(),
            )
            .unwrap();
        store
            .insert_partner(account.id, VehicleType::Bicycle, Utc::now())
            .unwrap()
            .id
    }

    #[test]
    fn latest_is_absent_before_any_sample() {
        let store = Store::new();
        let partner_id = partner(&store);

        assert!(LocationLedger::new(&store).latest(partner_id).is_none());
        assert!(LocationLedger::new(&store).history(partner_id, None).is_empty());
    }

    #[test]
    fn duplicate_samples_are_each_appended() {
        let store = Store::new();
        let partner_id = partner(&store);
        let ledger = LocationLedger::new(&store);

        let first = ledger.record(partner_id, 40.71, -74.0, None).unwrap();
        let second = ledger.record(partner_id, 40.71, -74.0, None).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(ledger.history(partner_id, None).len(), 2);
        assert_eq!(ledger.latest(partner_id).unwrap().id, second.id);

        let profile = store.partner(partner_id).unwrap();
        assert_eq!(profile.last_position_at, Some(second.recorded_at));
        assert_eq!(profile.current_position.unwrap().latitude, 40.71);
    }

    #[test]
    fn history_is_newest_first_and_filtered_by_order() {
        let store = Store::new();
        let partner_id = partner(&store);
        let ledger = LocationLedger::new(&store);

        ledger.record(partner_id, 1.0, 1.0, Some(10)).unwrap();
        ledger.record(partner_id, 2.0, 2.0, None).unwrap();
        ledger.record(partner_id, 3.0, 3.0, Some(10)).unwrap();
        ledger.record(partner_id, 4.0, 4.0, Some(11)).unwrap();

        let all = ledger.history(partner_id, None);
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].recorded_at > w[1].recorded_at));
        assert_eq!(all[0].latitude, 4.0);

        let tagged = ledger.history(partner_id, Some(10));
        assert_eq!(tagged.len(), 2);
        assert!(tagged.iter().all(|s| s.order_id == Some(10)));
        assert!(tagged[0].recorded_at > tagged[1].recorded_at);
        assert_eq!(tagged[0].latitude, 3.0);

        // The projection follows the newest sample regardless of its order tag.
        assert_eq!(ledger.latest(partner_id).unwrap().order_id, Some(11));
    }

    #[test]
    fn invalid_coordinates_are_rejected_without_writing() {
        let store = Store::new();
        let partner_id = partner(&store);
        let ledger = LocationLedger::new(&store);

        let result = ledger.record(partner_id, 123.0, 0.0, None);

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(ledger.latest(partner_id).is_none());
    }

    #[test]
    fn unknown_partner_is_not_found() {
        let store = Store::new();
        let result = LocationLedger::new(&store).record(77, 0.0, 0.0, None);
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
