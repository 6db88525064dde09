//! Error types for crm-auth.

/// Result type alias for crm-auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for crm-auth operations.
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

    /// Returns true if the server broke the authentication protocol.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Protocol(_) | ErrorKind::Challenge(_))
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The server did not follow the NTLM handshake protocol.
    #[error("Authentication protocol error: {0}")]
    Protocol(String),

    /// The server challenge (type 2 message) could not be parsed.
    #[error("Invalid server challenge: {0}")]
    Challenge(String),

    /// A transport failure aborted the handshake.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<crm_client::Error> for Error {
    fn from(err: crm_client::Error) -> Self {
        Error::with_source(ErrorKind::Transport(err.to_string()), err)
    }
}
