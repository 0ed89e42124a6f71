use std::io;

use http::StatusCode;

/// Errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not implemented")]
    NotImplemented,
    #[error("general failure: {0}")]
    GeneralFailure(String),
    #[error("resource exists")]
    Exists,
    #[error("resource not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient storage")]
    InsufficientStorage,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type of the storage operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// The error type of the engine.
///
/// Every variant maps to exactly one HTTP status, see [`DavError::statuscode`].
/// Only the dispatcher turns these into a response.
#[derive(Debug, thiserror::Error)]
pub enum DavError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("requested range not satisfiable (size {size})")]
    RangeNotSatisfiable { size: u64 },
    #[error("{0}")]
    Locked(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    InsufficientStorage(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed XML: {0}")]
    Xml(#[from] xmltree::ParseError),
}

impl DavError {
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DavError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DavError::Forbidden(_) => StatusCode::FORBIDDEN,
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Conflict(_) => StatusCode::CONFLICT,
            DavError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            DavError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            DavError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DavError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            DavError::Locked(_) => StatusCode::LOCKED,
            DavError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            DavError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            DavError::Internal(_) | DavError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Xml(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message that is safe to send to the client.
    ///
    /// Internal failures are reduced to a fixed text so that paths and
    /// other backend details never end up in a response body.
    pub fn message(&self) -> String {
        match self {
            DavError::Internal(_) | DavError::Io(_) => "Internal server error".to_string(),
            DavError::Xml(_) => "Malformed XML body".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the connection should be closed after sending the reply.
    pub fn must_close(&self) -> bool {
        matches!(
            self,
            DavError::PayloadTooLarge(_) | DavError::Io(_) | DavError::Internal(_)
        )
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotImplemented => DavError::NotImplemented("Not implemented".into()),
            FsError::GeneralFailure(msg) => DavError::Internal(msg),
            FsError::Exists => DavError::MethodNotAllowed("Resource already exists".into()),
            FsError::NotFound => DavError::NotFound("Resource not found".into()),
            FsError::Forbidden => DavError::Forbidden("Forbidden".into()),
            FsError::Conflict(msg) => DavError::Conflict(msg),
            FsError::InsufficientStorage => {
                DavError::InsufficientStorage("Insufficient storage".into())
            }
            FsError::ChecksumMismatch => {
                DavError::InvalidRequest("The checksum does not match the content".into())
            }
            FsError::Io(e) => DavError::Io(e),
        }
    }
}
