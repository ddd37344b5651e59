//! Error types for the earshot server

use thiserror::Error;

/// Result type alias for earshot operations
pub type Result<T> = std::result::Result<T, ServeError>;

/// Error types that can occur while resolving and serializing a request
#[derive(Error, Debug, Clone)]
pub enum ServeError {
    #[error("Unsupported range unit: {0}")]
    RangeUnitUnsupported(String),

    #[error("Unsatisfiable range: {0}")]
    UnsatisfiableRange(String),

    #[error("No serializer matches the request context")]
    NoMatchingSerializer,

    #[error("Cannot render arrays of rank {0}")]
    UnsupportedRank(usize),

    #[error("Render deadline exceeded: {0}")]
    RenderTimeout(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Audio encode error: {0}")]
    Encode(String),

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServeError {
    fn from(err: std::io::Error) -> Self {
        ServeError::Io(err.to_string())
    }
}

impl ServeError {
    /// Convert error to HTTP status code
    ///
    /// Range errors map to 416 Range Not Satisfiable, evaluation errors are
    /// client errors, a missed render deadline is a gateway timeout, and
    /// everything else is a server-side failure.
    pub fn to_http_status(&self) -> u16 {
        match self {
            ServeError::RangeUnitUnsupported(_) => 416,
            ServeError::UnsatisfiableRange(_) => 416,

            ServeError::Eval(_) => 400,
            ServeError::NotFound(_) => 404,
            ServeError::RenderTimeout(_) => 504,

            ServeError::NoMatchingSerializer => 500,
            ServeError::UnsupportedRank(_) => 500,
            ServeError::Render(_) => 500,
            ServeError::Encode(_) => 500,
            ServeError::Config(_) => 500,
            ServeError::Io(_) => 500,
            ServeError::Internal(_) => 500,
        }
    }
}
