//! Rule violations raised by account records before any I/O happens.

use thiserror::Error;

use crate::id::TokenId;

pub type DomainResult<T> = Result<T, DomainError>;

/// A user, role or activation token refused a state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Sign-up data a `User` cannot be built from.
    #[error("invalid account data: {0}")]
    InvalidAccount(String),

    /// An activation token can be stamped once.
    #[error("activation token {0} was already validated")]
    TokenAlreadyValidated(TokenId),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_account(msg: impl Into<String>) -> Self {
        Self::InvalidAccount(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
