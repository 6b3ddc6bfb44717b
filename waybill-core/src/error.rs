//! Error types shared by every waybill component.
//!
//! Parsing failures are returned at the point of detection and never retried
//! internally. A route that does not match is not an error; the router reports
//! it as `None`.

/// Errors produced while parsing URIs, bodies, multipart streams and route templates.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input does not follow the accepted URI grammar.
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// A multipart body does not start with the boundary declared in its content type.
    #[error("multipart body does not start with boundary `--{boundary}`")]
    BoundaryMismatch { boundary: String },

    /// Multipart part headers are malformed or never terminated.
    #[error("malformed multipart headers: {0}")]
    MalformedHeaders(String),

    /// The headers of a single multipart part exceeded the configured budget.
    #[error("multipart headers exceed maximum allowed size of {limit} bytes")]
    MaxHeaderSizeExceeded { limit: usize },

    /// Structured (JSON) decoding failed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A route template could not be compiled.
    #[error("invalid route template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A multipart stream ended before its closing boundary.
    #[error("incomplete multipart body: {0}")]
    Incomplete(String),

    /// The underlying body stream failed (aborted, reset, destroyed).
    #[error("body stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Create an [`Error::InvalidTemplate`] for the given template source.
    pub fn invalid_template<T: Into<String>, R: Into<String>>(template: T, reason: R) -> Self {
        Error::InvalidTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Wrap any transport error into an [`Error::Stream`].
    pub fn stream<E: std::fmt::Display>(err: E) -> Self {
        Error::Stream(err.to_string())
    }

    /// Returns whether this error came from the underlying transport stream
    /// rather than from malformed content.
    pub fn is_stream(&self) -> bool {
        matches!(self, Error::Stream(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
