//! Order lifecycle rules. Pure: callers persist the resulting [`Transition`].

use thiserror::Error;

use crate::auth::Session;
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::order::{Order, OrderStatus};

/// How the acting session relates to the order being changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    OwningVendor,
    AssignedPartner,
    Customer,
    Unrelated,
}

impl Relation {
    pub fn of(session: &Session, order: &Order) -> Self {
        match session.role {
            Role::Vendor if session.vendor_id == Some(order.vendor_id) => Relation::OwningVendor,
            Role::Delivery if session.partner_id.is_some() && session.partner_id == order.partner_id => {
                Relation::AssignedPartner
            }
            Role::Customer if session.account_id == order.customer_id => Relation::Customer,
            _ => Relation::Unrelated,
        }
    }

    pub fn is_party(&self) -> bool {
        !matches!(self, Relation::Unrelated)
    }
}

/// A validated status change, ready to be written conditionally on `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// The completion timestamp is written together with the status.
    pub stamps_delivery: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denied {
    #[error("not permitted to change this order")]
    Unauthorized,

    #[error("order is already {0} and can no longer change")]
    Terminal(OrderStatus),

    #[error("orders become assigned only through partner assignment")]
    AssignmentOnly,

    #[error("cannot move order from {from} to {to}")]
    InvalidEdge { from: OrderStatus, to: OrderStatus },
}

impl From<Denied> for AppError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::Unauthorized => AppError::Unauthorized(denied.to_string()),
            Denied::Terminal(_) | Denied::AssignmentOnly | Denied::InvalidEdge { .. } => {
                AppError::Conflict(denied.to_string())
            }
        }
    }
}

/// Statuses reachable from `status` in one step, including the
/// assignment-only `pending -> assigned` edge.
pub fn successors(status: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match status {
        Pending => &[Assigned, Cancelled],
        Assigned => &[PickedUp, Cancelled],
        PickedUp => &[InTransit, Delivered],
        InTransit => &[Delivered],
        Delivered => &[],
        Cancelled => &[],
    }
}

pub fn transition(
    current: OrderStatus,
    requested: OrderStatus,
    role: Role,
    relation: Relation,
) -> Result<Transition, Denied> {
    let permitted = matches!(
        (role, relation),
        (Role::Vendor, Relation::OwningVendor) | (Role::Delivery, Relation::AssignedPartner)
    );
    if !permitted {
        return Err(Denied::Unauthorized);
    }

    if current.is_terminal() {
        return Err(Denied::Terminal(current));
    }

    if (current, requested) == (OrderStatus::Pending, OrderStatus::Assigned) {
        return Err(Denied::AssignmentOnly);
    }

    if !successors(current).contains(&requested) {
        return Err(Denied::InvalidEdge {
            from: current,
            to: requested,
        });
    }

    Ok(Transition {
        from: current,
        to: requested,
        stamps_delivery: requested == OrderStatus::Delivered,
    })
}

#[cfg(test)]
mod tests {
    use super::{Denied, Relation, successors, transition};
    use crate::models::account::Role;
    use crate::models::order::OrderStatus::{self, *};

    const ALLOWED_DIRECT: [(OrderStatus, OrderStatus); 6] = [
        (Assigned, PickedUp),
        (PickedUp, InTransit),
        (PickedUp, Delivered),
        (InTransit, Delivered),
        (Pending, Cancelled),
        (Assigned, Cancelled),
    ];

    #[test]
    fn vendor_may_walk_every_direct_edge() {
        for (from, to) in ALLOWED_DIRECT {
            let result = transition(from, to, Role::Vendor, Relation::OwningVendor);
            assert!(result.is_ok(), "{from} -> {to} should be allowed");
        }
    }

    #[test]
    fn every_edge_outside_the_graph_is_denied() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if ALLOWED_DIRECT.contains(&(from, to)) {
                    continue;
                }
                let result = transition(from, to, Role::Delivery, Relation::AssignedPartner);
                assert!(result.is_err(), "{from} -> {to} should be denied");
            }
        }
    }

    #[test]
    fn direct_assignment_is_reserved_for_the_coordinator() {
        let result = transition(Pending, Assigned, Role::Vendor, Relation::OwningVendor);
        assert_eq!(result, Err(Denied::AssignmentOnly));
        assert!(successors(Pending).contains(&Assigned));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Delivered, Cancelled] {
            assert!(successors(terminal).is_empty());
            let result = transition(terminal, Pending, Role::Vendor, Relation::OwningVendor);
            assert_eq!(result, Err(Denied::Terminal(terminal)));
        }
    }

    #[test]
    fn unrelated_actors_are_unauthorized_before_edge_checks() {
        let cases = [
            (Role::Vendor, Relation::Unrelated),
            (Role::Delivery, Relation::Unrelated),
            (Role::Customer, Relation::Customer),
            (Role::Customer, Relation::Unrelated),
        ];
        for (role, relation) in cases {
            let result = transition(Delivered, Pending, role, relation);
            assert_eq!(result, Err(Denied::Unauthorized));
        }
    }

    #[test]
    fn only_delivery_stamps_completion() {
        let delivered = transition(InTransit, Delivered, Role::Delivery, Relation::AssignedPartner)
            .unwrap();
        assert!(delivered.stamps_delivery);

        let picked = transition(Assigned, PickedUp, Role::Delivery, Relation::AssignedPartner)
            .unwrap();
        assert!(!picked.stamps_delivery);
    }
}
