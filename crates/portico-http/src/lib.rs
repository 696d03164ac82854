//! Resilient HTTP client for Portico
//!
//! This crate provides the client that every module shares through the
//! host's HTTP service: a TTL response cache, retry with exponential
//! backoff, bearer-token injection and normalization of responses and
//! errors, layered over a pluggable raw `Transport`.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod transport;

// Re-export main types
pub use api::{
    FilePart, FormValue, HttpMethod, HttpResponse, RequestBody, RequestOptions, ResponseBody,
    UploadPayload,
};
pub use cache::{cache_key, CacheEntry, CacheStats, RequestCache};
pub use client::{ResilientHttpClient, RetryEvent, RetryObserver};
pub use config::{BackoffConfig, ClientConfig, ClientOverrides, RetryPolicy};
pub use transport::{RawRequest, RawResponse, ReqwestTransport, Transport, TransportFailure};

use portico_core::error::PorticoError;

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, PorticoError>;
