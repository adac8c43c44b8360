//! # RepoWatch GitHub
//!
//! Event source backed by the GitHub REST events API.

pub mod events;

pub use events::GithubEventSource;
