//! Error types for crm-rest.

/// Result type alias for crm-rest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for crm-rest operations.
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

    /// Returns true if the service itself rejected the request.
    pub fn is_service_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Service { .. })
    }

    /// The HTTP status the service answered with, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Service { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The service answered with a non-success status.
    #[error("Service error: HTTP {status}: {message}")]
    Service { status: u16, message: String },

    /// The NTLM handshake failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A transport failure prevented the exchange from completing.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The entity schema could not be loaded or parsed.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A success response carried a body or header the client cannot read.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The caller passed an argument the operation cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<crm_auth::Error> for Error {
    fn from(err: crm_auth::Error) -> Self {
        let kind = match err.kind {
            crm_auth::ErrorKind::Transport(ref msg) => ErrorKind::Transport(msg.clone()),
            _ => ErrorKind::Auth(err.to_string()),
        };
        Error::with_source(kind, err)
    }
}

impl From<crm_client::Error> for Error {
    fn from(err: crm_client::Error) -> Self {
        Error::with_source(ErrorKind::Transport(err.to_string()), err)
    }
}

impl From<crm_metadata::Error> for Error {
    fn from(err: crm_metadata::Error) -> Self {
        Error::with_source(ErrorKind::Metadata(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(
            ErrorKind::InvalidArgument(format!("invalid service URL: {err}")),
            err,
        )
    }
}
