//! shorts-scraper library interface
//!
//! Collects text stories from subreddits and stores the new ones.

pub mod ingest;
pub mod reddit;
pub mod source;

pub use ingest::{ingest, IngestOptions, IngestSummary};
pub use reddit::RedditClient;
pub use source::{ContentSource, SourceError};
