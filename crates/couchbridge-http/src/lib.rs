//! couchbridge-http: async HTTP transport for the CouchDB client
//!
//! Provides connection pooling, latency measurement and streamed bodies on
//! top of `reqwest`.
//!
//! # Architecture
//!
//! - `HttpClient`: Connection-pooled async HTTP client
//! - `RequestBuilder`: Request builder with headers, query, body, auth
//! - `HttpResponse`: Buffered response wrapper with latency measurement
//! - `StreamingResponse`: Response whose body is consumed incrementally
//!
//! The CouchDB API itself lives in the `couchbridge` crate.

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use client::HttpClient;
pub use config::HttpClientConfig;
pub use error::{HttpError, HttpErrorCategory, HttpResult};
pub use request::{Auth, RequestBody, RequestBuilder};
pub use response::{HttpResponse, HttpResponseBuilder, StreamingResponse};

// Re-export shared HTTP types from couchbridge-common
pub use couchbridge_common::http::{HttpMethod, HttpResponseLike, HttpStatus};
