//! Core identifier types and utilities for keyward.
//!
//! This crate provides the foundational types shared by the identity
//! library and the server: strongly-typed identifiers and the `Result`
//! alias used for layered error reporting.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, RequestId, UserIdentifier};
