//! # crm-client
//!
//! Core HTTP client infrastructure for the Dynamics CRM Web API.
//!
//! This crate provides the foundational HTTP transport with:
//! - Connection pooling with keep-alive reuse (required by the NTLM handshake,
//!   which authenticates a TCP connection rather than a request)
//! - Verb-dispatched request building (GET/POST/PATCH/DELETE)
//! - Fully buffered responses with case-insensitive header access
//! - Request/response tracing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │                 (crm-auth, crm-rest)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HttpClient                             │
//! │  - Raw HTTP over a shared keep-alive pool                   │
//! │  - Request building, response buffering                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Redirects are disabled by default: the second round of the NTLM handshake
//! must observe the service's response directly, never a redirect target.
//! There is no retry layer and no default timeout; every failure is terminal
//! for its operation and callers needing timeouts wrap calls externally.

mod client;
mod config;
mod error;
mod request;
mod response;

pub use client::HttpClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, ErrorKind, Result};
pub use request::{RequestBody, RequestBuilder, RequestMethod};
pub use response::Response;

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("crm-web-api/", env!("CARGO_PKG_VERSION"));
