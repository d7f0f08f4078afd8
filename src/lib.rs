// Library exports for the photo-card marketplace core.
// The binary and the integration tests both build on these modules.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod exchange;
pub mod extractors;
pub mod inventory;
pub mod ledger;
pub mod purchase;
pub mod routes;
pub mod shop;
pub mod state;
pub mod users;
