//! livecast signaling server library.
//! This crate exposes internal modules for integration testing and for the
//! viewer client. The binary entry point is in main.rs.

pub mod auth;
pub mod client;
pub mod config;
pub mod hub;
pub mod moderation;
pub mod routes;
pub mod state;
pub mod stream;
pub mod ws;
