//! Error types for couchbridge

use thiserror::Error;

/// Result type alias for couchbridge operations
pub type Result<T> = std::result::Result<T, CouchError>;

/// Unified error type for all couchbridge operations
///
/// The first block of variants mirrors the HTTP status codes CouchDB uses to
/// report request failures. The remaining variants cover failures that happen
/// on the client side of the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouchError {
    /// 400: malformed request, e.g. an invalid revision
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 401: missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403: authenticated but not permitted
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404: database, document, attachment or view does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// 409: revision conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 412: e.g. the database already exists
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// 415: bad Content-Type
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// 417: e.g. a bulk request was rejected as a whole
    #[error("Expectation failed: {0}")]
    ExpectationFailed(String),

    /// Any other non-success status (5xx or an unmapped 4xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Transport failure (connection, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Caller passed a combination of arguments the operation cannot honor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CouchError {
    /// Translate a non-success HTTP status into the matching error variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => CouchError::BadRequest(message),
            401 => CouchError::Unauthorized(message),
            403 => CouchError::Forbidden(message),
            404 => CouchError::NotFound(message),
            409 => CouchError::Conflict(message),
            412 => CouchError::PreconditionFailed(message),
            415 => CouchError::UnsupportedMediaType(message),
            417 => CouchError::ExpectationFailed(message),
            _ => CouchError::Server { status, message },
        }
    }

    /// The HTTP status this error was derived from, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CouchError::BadRequest(_) => Some(400),
            CouchError::Unauthorized(_) => Some(401),
            CouchError::Forbidden(_) => Some(403),
            CouchError::NotFound(_) => Some(404),
            CouchError::Conflict(_) => Some(409),
            CouchError::PreconditionFailed(_) => Some(412),
            CouchError::UnsupportedMediaType(_) => Some(415),
            CouchError::ExpectationFailed(_) => Some(417),
            CouchError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, CouchError::NotFound(_))
    }

    /// Returns true for a revision conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchError::Conflict(_))
    }

    /// Returns true if the credentials were rejected or lack privileges
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            CouchError::Unauthorized(_) | CouchError::Forbidden(_)
        )
    }
}

impl From<serde_json::Error> for CouchError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            CouchError::Deserialization(err.to_string())
        } else {
            CouchError::Serialization(err.to_string())
        }
    }
}
