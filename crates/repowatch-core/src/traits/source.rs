//! Event source trait: fetches raw repository activity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::types::{FetchPage, RepoIdentity};

/// Remote activity feed for a repository.
///
/// A fetch returns a finite, possibly truncated batch; whatever is not
/// returned is picked up on a later cycle through the same watermark.
/// A truncated batch must therefore hold the oldest events after `since`,
/// never a newest slice with a gap behind it.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Source name (e.g., "github").
    fn name(&self) -> &str;

    /// Fetch events of the given types created after `since`.
    async fn fetch(
        &self,
        repo: &RepoIdentity,
        event_types: &[String],
        since: Option<DateTime<Utc>>,
    ) -> std::result::Result<FetchPage, FetchError>;
}
