//! CSDL (`$metadata`) document parsing.
//!
//! The document shape, reduced to what matters here:
//!
//! ```text
//! <edmx:Edmx>
//!   <edmx:DataServices>
//!     <Schema Namespace="mscrm">
//!       <EntityType Name="account">
//!         <Key><PropertyRef Name="accountid"/></Key>
//!         <NavigationProperty Name="primarycontactid" Type="mscrm.contact">
//!           <ReferentialConstraint Property="_primarycontactid_value"
//!                                  ReferencedProperty="contactid"/>
//!         </NavigationProperty>
//!       </EntityType>
//!     </Schema>
//!   </edmx:DataServices>
//! </edmx:Edmx>
//! ```

use serde::Deserialize;

use crate::error::Result;
use crate::types::{EntityMetadata, FieldMetadata};

#[derive(Debug, Deserialize)]
struct Edmx {
    #[serde(rename = "DataServices")]
    data_services: DataServices,
}

#[derive(Debug, Deserialize)]
struct DataServices {
    #[serde(rename = "Schema", default)]
    schemas: Vec<SchemaDef>,
}

#[derive(Debug, Deserialize)]
struct SchemaDef {
    #[serde(rename = "@Namespace")]
    namespace: Option<String>,
    #[serde(rename = "EntityType", default)]
    entity_types: Vec<EntityTypeDef>,
}

#[derive(Debug, Deserialize)]
struct EntityTypeDef {
    #[serde(rename = "@Name")]
    name: String,
    #[serde(rename = "Key")]
    key: Option<KeyDef>,
    // A lone NavigationProperty deserializes into a one-element Vec, which is
    // exactly the single-to-sequence normalization the document needs.
    #[serde(rename = "NavigationProperty", default)]
    navigation_properties: Vec<NavigationPropertyDef>,
}

#[derive(Debug, Deserialize)]
struct KeyDef {
    #[serde(rename = "PropertyRef", default)]
    property_refs: Vec<PropertyRefDef>,
}

#[derive(Debug, Deserialize)]
struct PropertyRefDef {
    #[serde(rename = "@Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct NavigationPropertyDef {
    #[serde(rename = "@Name")]
    name: String,
    #[serde(rename = "@Type")]
    type_name: String,
    #[serde(rename = "ReferentialConstraint")]
    referential_constraint: Option<ReferentialConstraintDef>,
}

#[derive(Debug, Deserialize)]
struct ReferentialConstraintDef {
    #[serde(rename = "@Property")]
    property: String,
    #[serde(rename = "@ReferencedProperty")]
    referenced_property: String,
}

/// Parse a `$metadata` CSDL document into entity metadata.
pub fn parse_metadata(xml: &str) -> Result<Vec<EntityMetadata>> {
    let edmx: Edmx = quick_xml::de::from_str(xml)?;

    let mut entities = Vec::new();
    for schema in edmx.data_services.schemas {
        let namespace_prefix = schema
            .namespace
            .map(|ns| format!("{ns}."))
            .unwrap_or_else(|| "mscrm.".to_string());

        for entity_type in schema.entity_types {
            let primary_key = entity_type
                .key
                .and_then(|k| k.property_refs.into_iter().next())
                .map(|r| r.name)
                .unwrap_or_else(|| format!("{}id", entity_type.name));

            let fields = entity_type
                .navigation_properties
                .into_iter()
                .map(|prop| field_from_navigation_property(prop, &namespace_prefix))
                .collect();

            entities.push(EntityMetadata {
                name: entity_type.name,
                primary_key,
                fields,
            });
        }
    }

    Ok(entities)
}

fn field_from_navigation_property(
    prop: NavigationPropertyDef,
    namespace_prefix: &str,
) -> FieldMetadata {
    let schema_name = strip_value_decoration(&prop.name).to_string();

    match prop.referential_constraint {
        Some(constraint) => FieldMetadata {
            name: strip_value_decoration(&constraint.property).to_string(),
            schema_name,
            lookup_entity_name: Some(
                prop.type_name
                    .strip_prefix(namespace_prefix)
                    .unwrap_or(&prop.type_name)
                    .to_string(),
            ),
            lookup_entity_primary_key: Some(constraint.referenced_property),
            field_type: prop.type_name,
        },
        None => FieldMetadata {
            name: schema_name.clone(),
            schema_name,
            field_type: prop.type_name,
            lookup_entity_name: None,
            lookup_entity_primary_key: None,
        },
    }
}

/// Strip the `_<name>_value` decoration the wire format puts on lookup keys.
fn strip_value_decoration(name: &str) -> &str {
    name.strip_prefix('_')
        .and_then(|n| n.strip_suffix("_value"))
        .unwrap_or(name)
}
