//! Authentication gate for the broadcaster and admin roles.
//!
//! Broadcaster identity is checked by an external verifier (see
//! [`verifier::IdentityVerifier`]) and then against an allow-list; admin
//! credentials are a static in-memory table.

pub mod admin;
pub mod gate;
pub mod jwt;
pub mod tokeninfo;
pub mod verifier;
