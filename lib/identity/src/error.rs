//! Error types for the identity crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures reported by an account store implementation
//! - `IdentityError`: Failures of resolution, population and role
//!   administration. Store failures are wrapped as `IdentityError::Store`
//!   with the original `StoreError` report kept as the cause.

use keyward_core::UserIdentifier;
use std::fmt;

use crate::scheme::AuthScheme;

/// Errors reported by an account store.
///
/// The identity layer never retries these; they are passed through as the
/// cause of an `IdentityError::Store` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or failed transiently.
    Unavailable { reason: String },
    /// An account referenced by a write or list call no longer exists.
    AccountMissing { user_id: UserIdentifier },
    /// A write conflicted with existing data (e.g. duplicate user name).
    Conflict { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "account store unavailable: {reason}"),
            Self::AccountMissing { user_id } => {
                write!(f, "account '{user_id}' no longer exists in the store")
            }
            Self::Conflict { reason } => write!(f, "account store conflict: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from identity resolution, session population and role administration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The identifier or user name does not resolve to any account.
    NotFound { key: String },
    /// The account exists but is disabled (locked).
    Unauthorized { user_id: UserIdentifier },
    /// The caller lacks the role required for the operation.
    Forbidden { required_role: String },
    /// Malformed input, such as an empty user name.
    InvalidArgument { reason: String },
    /// A populator's structural precondition is unmet.
    PopulationFailed { scheme: AuthScheme, claim: String },
    /// The account store failed; the store's report is the cause.
    Store,
    /// The request was cancelled before the operation completed.
    Cancelled,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "no account found for '{key}'"),
            Self::Unauthorized { user_id } => {
                write!(f, "account '{user_id}' is disabled")
            }
            Self::Forbidden { required_role } => {
                write!(f, "caller lacks required role '{required_role}'")
            }
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::PopulationFailed { scheme, claim } => {
                write!(
                    f,
                    "session population for scheme '{scheme}' requires missing claim '{claim}'"
                )
            }
            Self::Store => write!(f, "account store operation failed"),
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for IdentityError {}
