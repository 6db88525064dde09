//! # crm-web-api
//!
//! A Dynamics CRM Web API client library for Rust, speaking NTLM to
//! on-premises organization services.
//!
//! ## Security
//!
//! - Passwords are redacted in Debug output
//! - Tracing skips credential parameters
//! - Error messages never echo credential data
//!
//! ## Crates
//!
//! - **crm-client** - Core HTTP client infrastructure
//! - **crm-auth** - NTLM authentication: message assembly and the
//!   two-round-trip handshake
//! - **crm-metadata** - Entity schema ($metadata CSDL) parsing
//! - **crm-rest** - The entity model and CRUD, query, and relationship
//!   operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crm_web_api::{CrmConnection, CrmManager, Entity};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = CrmConnection::new(
//!         "https://crm.contoso.com/api/data/v9.1",
//!         "jdoe",
//!         "hunter2",
//!         "CONTOSO",
//!     );
//!     let mut manager = CrmManager::new(connection)?;
//!     manager.connect().await?;
//!
//!     let mut account = Entity::with_fields("account", [("name", "Contoso Ltd")]);
//!     manager.create(&mut account).await?;
//!     println!("created {:?}", account.entity_id);
//!
//!     Ok(())
//! }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export the member crates for convenient access
#[cfg(feature = "auth")]
#[cfg_attr(docsrs, doc(cfg(feature = "auth")))]
pub use crm_auth as auth;
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub use crm_client as client;
#[cfg(feature = "metadata")]
#[cfg_attr(docsrs, doc(cfg(feature = "metadata")))]
pub use crm_metadata as metadata;
#[cfg(feature = "rest")]
#[cfg_attr(docsrs, doc(cfg(feature = "rest")))]
pub use crm_rest as rest;

// Re-export commonly used types at the top level
#[cfg(feature = "client")]
pub use crm_client::{ClientConfig, HttpClient};

#[cfg(feature = "auth")]
pub use crm_auth::NtlmCredentials;

#[cfg(feature = "metadata")]
pub use crm_metadata::MetadataSet;

#[cfg(feature = "rest")]
pub use crm_rest::{CrmConnection, CrmManager, Entity, Field, FieldType, FieldValue, Reference};
