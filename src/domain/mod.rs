//! Ledger entities, their state rules, and the ports the application layer
//! depends on.

pub mod escrow;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod ports;
pub mod project;
