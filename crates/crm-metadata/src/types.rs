//! The parsed entity schema model.

/// Schema description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    /// The entity's logical name.
    pub name: String,
    /// The entity's primary key attribute (usually `<name>id`).
    pub primary_key: String,
    /// Relationship field definitions.
    pub fields: Vec<FieldMetadata>,
}

impl EntityMetadata {
    /// Relationship fields that point at the given target entity through its
    /// primary key. Several fields of one entity can target the same entity
    /// (e.g. `createdby` and `modifiedby` both target `systemuser`), so this
    /// can yield more than one candidate.
    pub fn lookup_fields_targeting<'a>(
        &'a self,
        target_entity: &'a str,
    ) -> impl Iterator<Item = &'a FieldMetadata> + 'a {
        let target_key = format!("{target_entity}id");
        self.fields.iter().filter(move |f| {
            f.lookup_entity_name.as_deref() == Some(target_entity)
                && f.lookup_entity_primary_key.as_deref() == Some(target_key.as_str())
        })
    }
}

/// Schema description of one relationship (navigation property) field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    /// The logical field name used in entity payloads.
    pub name: String,
    /// The wire schema name used in `@odata.bind` keys.
    pub schema_name: String,
    /// The declared CSDL type of the navigation property.
    pub field_type: String,
    /// Target entity logical name, when the field is a lookup.
    pub lookup_entity_name: Option<String>,
    /// Target entity primary key, when the field is a lookup.
    pub lookup_entity_primary_key: Option<String>,
}

/// The full schema for one connection, keyed by entity logical name.
///
/// Written once by `connect`, read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct MetadataSet {
    entities: Vec<EntityMetadata>,
}

impl MetadataSet {
    /// Build a set from parsed entity metadata.
    pub fn new(entities: Vec<EntityMetadata>) -> Self {
        Self { entities }
    }

    /// Look up an entity's metadata by logical name.
    pub fn get(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Whether any schema has been loaded.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entity types in the set.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over all entity types.
    pub fn iter(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.iter()
    }
}
