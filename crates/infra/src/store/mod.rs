//! Credential persistence: users, roles and activation tokens.
//!
//! The trait makes no storage assumptions; `InMemoryCredentialStore` backs
//! tests and dev runs, `PostgresCredentialStore` backs deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryCredentialStore;
pub use postgres::PostgresCredentialStore;
pub use r#trait::{CredentialStore, StoreError};
