//! Collaborator traits at the edges of the polling pipeline.

pub mod sink;
pub mod source;
pub mod store;

pub use sink::NotificationSink;
pub use source::EventSource;
pub use store::EventStore;
