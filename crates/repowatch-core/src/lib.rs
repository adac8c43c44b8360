//! # RepoWatch Core
//!
//! Shared domain types, collaborator traits, configuration and errors.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RepoWatchConfig;
pub use error::{FetchError, RepoWatchError, Result};
pub use traits::{EventSource, EventStore, NotificationSink};
pub use types::*;
