//! Content source capability

use async_trait::async_trait;
use shorts_common::Item;
use std::time::Duration;
use thiserror::Error;

/// Content source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Yields candidate stories for one community
///
/// A failure is scoped to the community it was raised for; callers move on
/// to the next community.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stories created within `window` of now
    async fn fetch(&self, community: &str, window: Duration) -> Result<Vec<Item>, SourceError>;
}
