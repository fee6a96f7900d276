pub mod escrow;
pub mod health;
pub mod payments;
pub mod projects;
