//! # RepoWatch Gateway
//!
//! Axum HTTP API for managing monitors and reading their history.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
