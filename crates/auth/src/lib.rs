//! `bootnet-auth`: pure authentication boundary.
//!
//! Accounts, roles, activation tokens, password hashing and bearer tokens.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod activation;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod roles;
pub mod user;

pub use activation::{ActivationCodeGenerator, ActivationPolicy, ActivationToken};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtValidator, TokenError, TokenIssuer};
pub use password::{PasswordError, hash_password, verify_password};
pub use principal::Principal;
pub use roles::{Role, RoleName, default_roles};
pub use user::{AuthFailure, NewUser, User};
