//! # crm-metadata
//!
//! Entity schema parsing for the Dynamics CRM Web API.
//!
//! The service describes its entity model in a CSDL (`$metadata`) XML
//! document. This crate reduces that document to the one thing the client
//! actually needs it for: mapping a lookup field's logical name to the wire
//! "navigation property" schema name required by the `@odata.bind`
//! relationship syntax.
//!
//! The schema is loaded once per connection and treated as immutable for the
//! connection's lifetime.

mod csdl;
mod error;
mod types;

pub use csdl::parse_metadata;
pub use error::{Error, ErrorKind, Result};
pub use types::{EntityMetadata, FieldMetadata, MetadataSet};
