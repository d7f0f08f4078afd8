//! Peer-to-peer card exchanges: one idle card offered for one listed unit.
//!
//! [`domain`] holds the pure status machine, [`store`] the row-level
//! primitives other components reuse inside their own transactions, and
//! [`engine`] the transactional operations.

pub mod domain;
pub mod engine;
pub mod store;

pub use domain::{Decision, RejectReason};
pub use engine::{AcceptedExchange, ExchangeEngine, ProposalView};
