pub mod account;
pub mod order;
pub mod partner;
pub mod position;
pub mod vendor;
