//! Error types for crm-metadata.

/// Result type alias for crm-metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for crm-metadata operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The CSDL document could not be parsed.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// The document parsed but is not a CSDL schema.
    #[error("Invalid schema document: {0}")]
    InvalidSchema(String),
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Error::with_source(ErrorKind::Parse(err.to_string()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::new(ErrorKind::Parse("unexpected end of input".to_string()));
        assert!(err.to_string().contains("XML parse error"));

        let err = Error::new(ErrorKind::InvalidSchema("no entity types".to_string()));
        assert!(err.to_string().contains("Invalid schema document"));
    }
}
