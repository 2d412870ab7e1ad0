pub mod connection;
pub mod handler;
pub mod protocol;
pub mod registry;
