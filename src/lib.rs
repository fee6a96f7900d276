//! Settlement backend for a freelance marketplace: funds projects from
//! accepted proposals, holds client money in escrow, reconciles payment
//! provider webhooks and releases or refunds on the completion protocol.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
