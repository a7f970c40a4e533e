//! Infrastructure layer: credential persistence, caching, notifications,
//! configuration and the account flows that compose them.

pub mod accounts;
pub mod cache;
pub mod config;
pub mod notifications;
pub mod store;
