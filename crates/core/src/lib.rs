//! `bootnet-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{RoleId, TokenId, UserId};
