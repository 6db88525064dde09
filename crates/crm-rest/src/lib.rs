//! # crm-rest
//!
//! Entity model and operations for the Dynamics CRM Web API over NTLM.
//!
//! [`CrmManager`] is the entry point: describe a connection, `connect` to
//! load the entity schema, then work with dynamically typed [`Entity`]
//! records.
//!
//! ```no_run
//! use crm_rest::{CrmConnection, CrmManager, Entity, Reference};
//!
//! # async fn run() -> crm_rest::Result<()> {
//! let connection = CrmConnection::new(
//!     "https://crm.contoso.com/api/data/v9.1",
//!     "jdoe",
//!     "hunter2",
//!     "CONTOSO",
//! );
//! let mut manager = CrmManager::new(connection)?;
//! manager.connect().await?;
//!
//! let mut account = Entity::with_fields("account", [("name", "Contoso Ltd")]);
//! manager.create(&mut account).await?;
//!
//! let found = manager
//!     .retrieve(&account.entity_reference().unwrap())
//!     .await?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```

mod entity;
mod error;
mod manager;
mod naming;
mod operations;
mod value;

pub use entity::{Entity, Field, Reference};
pub use error::{Error, ErrorKind, Result};
pub use manager::{CrmConnection, CrmManager, SendOutcome};
pub use naming::{format_guid, is_empty_guid, plural_name};
pub use value::{convert, infer_type, FieldType, FieldValue};
