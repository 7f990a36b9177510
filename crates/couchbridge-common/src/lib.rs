//! Common utilities for couchbridge
//!
//! This crate provides the error taxonomy and HTTP value types shared by the
//! transport crate and the CouchDB API crate.

pub mod error;
pub mod http;

pub use error::{CouchError, Result};
pub use http::{HttpMethod, HttpStatus, HttpResponseLike};
