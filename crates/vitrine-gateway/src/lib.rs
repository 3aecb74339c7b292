//! The backend-for-frontend layer on top of the engine: an upstream
//! [`fetch::Fetcher`] contract, per-request [`auth::Credentials`], and a
//! [`context::RequestContext`] owning the request's loaders.

pub mod auth;
pub mod context;
pub mod fetch;
pub mod loaders;

pub use auth::Credentials;
pub use context::RequestContext;
pub use fetch::{FetchError, FetchResult, Fetcher, FetcherInner, HttpFetcher};
pub use loaders::{TrackedEntityLoader, TrackedEntityLoaderConfig};
