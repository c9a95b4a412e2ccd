//! keyward HTTP host.
//!
//! Exposes identity resolution and role administration over JSON:
//! - `GET /auth/principal/{user_id}`
//! - `GET /auth/session/{user_id}`
//! - `POST /admin/roles/unassign`
//! - `POST /admin/roles/assign`
//!
//! Lookups require the target user or the admin role and never return
//! provider tokens.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
pub mod state;
