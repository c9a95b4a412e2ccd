//! Identity resolution, session population and role administration.
//!
//! This crate provides:
//! - Account model and the `AccountStore` trait (with an in-memory store)
//! - Principals: immutable claim sets projected from stored accounts
//! - Sessions, session factories and pluggable session populators
//! - `IdentityResolver`: user id → principal → optional session
//! - `RoleAdmin`: gated role and permission assignment changes
//!
//! # Populator Lookup
//!
//! A session is only created when a populator applies to the request:
//! - A request-local populator always wins
//! - Otherwise the registry entry for the request's scheme, or for the
//!   registry's default scheme when the request names none
//! - Otherwise no session is created
//!
//! # Example
//!
//! ```
//! use keyward_core::UserIdentifier;
//! use keyward_identity::{Account, AuthMethod, Principal, claim_types};
//!
//! let account = Account::new(UserIdentifier::new("42").unwrap(), "alice")
//!     .with_roles(["Editor", "Admin"])
//!     .with_permissions(["Publish"]);
//!
//! let principal = Principal::from_account(&account, &[], AuthMethod::Identifier);
//! assert_eq!(principal.identifier(), Some("42"));
//!
//! let roles: Vec<&str> = principal.all(claim_types::ROLE).collect();
//! assert_eq!(roles, vec!["Admin", "Editor"]);
//! ```

pub mod account;
pub mod admin;
pub mod config;
pub mod error;
pub mod populator;
pub mod principal;
pub mod request;
pub mod resolver;
pub mod scheme;
pub mod session;
pub mod store;

pub use account::{Account, ProviderTokens};
pub use admin::{AssignRoles, RoleAdmin, RoleAssignmentResult, UnAssignRoles};
pub use config::{IdentityConfig, IdentityConfigBuilder};
pub use error::{IdentityError, StoreError};
pub use populator::{
    AccountProfilePopulator, ClaimsPopulator, OAuthPopulator, PopulatorRegistry, SessionPopulator,
};
pub use principal::{Claim, Principal, PrincipalBuilder, ProviderClaim, claim_types};
pub use request::{Caller, RequestContext};
pub use resolver::IdentityResolver;
pub use scheme::{AuthMethod, AuthScheme, ParseSchemeError};
pub use session::{DefaultSessionFactory, Session, SessionFactory};
pub use store::{AccountStore, InMemoryAccountStore};
