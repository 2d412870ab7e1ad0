pub mod assignment;
pub mod ledger;
pub mod lifecycle;
pub mod orders;
pub mod tracking;
