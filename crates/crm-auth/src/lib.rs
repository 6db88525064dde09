//! # crm-auth
//!
//! NTLM challenge/response authentication for the Dynamics CRM Web API.
//!
//! On-premise Dynamics deployments authenticate every logical operation with
//! a three-message NTLM exchange carried over two HTTP round trips:
//!
//! 1. The client sends a **negotiate** (type 1) message and keeps the
//!    connection alive.
//! 2. The server answers with a **challenge** (type 2) in the
//!    `WWW-Authenticate` header.
//! 3. The client proves knowledge of the password by sending an
//!    **authenticate** (type 3) message computed from the challenge, and
//!    closes the connection afterwards.
//!
//! The password never travels in clear; only NTLMv2 proof hashes do.
//!
//! ## Security
//!
//! - Passwords are redacted in `Debug` output
//! - Tracing skips credential parameters
//!
//! ## Example
//!
//! ```rust,ignore
//! use crm_auth::{ntlm_handshake, NtlmCredentials, RequestShape};
//! use crm_client::HttpClient;
//!
//! let http = HttpClient::default_client()?;
//! let creds = NtlmCredentials::new("jdoe", "hunter2", "CONTOSO", "crm.contoso.com");
//! let response = ntlm_handshake(&http, "https://crm.contoso.com/api/data/v8.2/accounts",
//!     &creds, |_, _| RequestShape::default()).await?;
//! ```

mod credentials;
mod error;
mod handshake;
mod message;

pub use credentials::NtlmCredentials;
pub use error::{Error, ErrorKind, Result};
pub use handshake::{ntlm_handshake, HandshakeRound, RequestShape};
pub use message::{authenticate_message, negotiate_message, ServerChallenge};
