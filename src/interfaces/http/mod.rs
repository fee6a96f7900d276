//! The JSON API served by `project-settlement serve`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
