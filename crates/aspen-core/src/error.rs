//! Error taxonomy exposed by the core.
//!
//! Services wrap these in `color_eyre` reports; the HTTP adapter walks
//! the report chain to recover the typed values and pick a status.

/// A protocol body that failed to decode, carrying the offending bytes
/// so the boundary can log them.
#[derive(Debug, thiserror::Error)]
#[error("parse error")]
pub struct ParseError {
    /// The bytes that failed to parse.
    pub content: Vec<u8>,
    #[source]
    pub source: plist::Error,
}

impl ParseError {
    pub fn new(content: impl Into<Vec<u8>>, source: plist::Error) -> Self {
        Self {
            content: content.into(),
            source,
        }
    }
}

/// Errors surfaced by the MDM core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The normalizer rejected the enrollment block.
    #[error("invalid enrollment: {0}")]
    InvalidEnrollment(String),

    /// No client certificate was presented.
    #[error("missing client certificate")]
    MissingCert,

    /// The enrollment has no certificate association yet and the
    /// message kind does not establish one.
    #[error("certificate not associated with enrollment")]
    Unbound,

    /// The certificate or enrollment is bound elsewhere.
    #[error("certificate mismatch for enrollment")]
    ForbiddenCertMismatch,

    /// A protocol body failed to decode.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An inner error that requests a specific HTTP status at the
    /// boundary.
    #[error("HTTP status {status}")]
    HttpStatus {
        status: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An optional handler is not configured.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),

    /// Storage backend failure, passed through.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an error so the HTTP boundary responds with `status`.
    pub fn http(status: u16, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::HttpStatus {
            status,
            source: source.into(),
        }
    }

    /// Wrap a storage backend failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage(source.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_preserves_cause() {
        let err = Error::http(403, Error::ForbiddenCertMismatch);
        let Error::HttpStatus { status, source } = &err else {
            panic!("expected HttpStatus");
        };
        assert_eq!(*status, 403);
        assert!(source.to_string().contains("mismatch"));
    }
}
