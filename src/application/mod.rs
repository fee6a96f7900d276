//! Settlement use cases.
//!
//! `SettlementCoordinator` drives project transitions, `EscrowManager` owns
//! escrow and wallet writes and `PaymentGateway` talks to the payment
//! provider. All three share one `LedgerStore` and express every change as
//! a single `LedgerTx`.

pub mod coordinator;
pub mod escrow;
pub mod gateway;
