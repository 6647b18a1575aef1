//! Versioned-source adapters.

mod github;
mod rate_limit;

pub use github::{GithubSourceClient, GithubSourceConfig};
pub use rate_limit::RateLimiter;
