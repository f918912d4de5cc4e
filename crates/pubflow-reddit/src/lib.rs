//! Collection-source client for Pubflow.
//!
//! Fetches paged subreddit listings via the Reddit OAuth API and exposes the
//! token-bucket rate limiter that gates every listing fetch. Rate-limit
//! responses surface the upstream `Retry-After` hint so the limiter and the
//! retry policy can both honour it.

mod client;
mod error;
mod rate_limit;
mod types;

pub use client::{RedditClient, DEFAULT_API_BASE_URL, DEFAULT_AUTH_BASE_URL};
pub use error::RedditError;
pub use rate_limit::TokenBucket;
pub use types::{ListingPage, RawPost};
