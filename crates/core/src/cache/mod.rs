//! URL-keyed image cache.
//!
//! Images are fetched through a [`Fetcher`] at most once per URL, even under
//! concurrent requests, and kept as files in the cache directory.

mod fetch_cache;
mod http_fetcher;
mod types;

pub use fetch_cache::FetchCache;
pub use http_fetcher::HttpFetcher;
pub use types::*;
