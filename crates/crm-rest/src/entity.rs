//! The dynamic entity and field model.
//!
//! Entities are bags of dynamically typed fields. A field's type is inferred
//! from its first value and never changes; conversion happens on later
//! assignment through [`Field::set`] and again on serialization.
//!
//! Serialization is metadata-driven: a lookup field whose value is a
//! [`Reference`] with a known id is emitted as an `@odata.bind` relationship
//! binding, everything else as a plain key/value pair.

use serde_json::Value;
use tracing::warn;

use crm_metadata::{EntityMetadata, MetadataSet};

use crate::naming::{format_guid, plural_name};
use crate::value::{convert, infer_type, to_wire, FieldType, FieldValue};

/// Annotation suffix that names the target entity of a `_<name>_value` key.
const LOOKUP_LOGICALNAME: &str = "@Microsoft.Dynamics.CRM.lookuplogicalname";
/// Annotation suffix the service puts on formatted (display) values.
const FORMATTED_VALUE: &str = "@OData.Community.Display.V1.FormattedValue";

/// A pointer to an entity: id plus logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    pub logical_name: String,
}

impl Reference {
    pub fn new(id: impl Into<String>, logical_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            logical_name: logical_name.into(),
        }
    }
}

/// One named, typed field of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    value: FieldValue,
    field_type: FieldType,
}

impl Field {
    /// Create a field, inferring its type from the initial value.
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        let field_type = infer_type(&value);
        Self {
            name: name.into(),
            value,
            field_type,
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type inferred when the field was created.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// The current value.
    pub fn get(&self) -> &FieldValue {
        &self.value
    }

    /// Assign a value, coercing it into the field's type.
    pub fn set(&mut self, value: impl Into<FieldValue>) {
        self.value = convert(value.into(), self.field_type);
    }

    /// Whether the field holds a value.
    pub fn has(&self) -> bool {
        self.value.is_set()
    }
}

/// A dynamically shaped entity record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// The entity's logical name (e.g. `account`).
    pub logical_name: String,
    /// The record id, when known.
    pub entity_id: Option<String>,
    fields: Vec<Field>,
}

impl Entity {
    /// Create an empty entity.
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            entity_id: None,
            fields: Vec::new(),
        }
    }

    /// Create an entity pre-populated with fields.
    pub fn with_fields<I, N, V>(logical_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<FieldValue>,
    {
        let mut entity = Entity::new(logical_name);
        for (name, value) in fields {
            entity.set(name, value);
        }
        entity
    }

    /// A reference to this record, when its id is known.
    pub fn entity_reference(&self) -> Option<Reference> {
        self.entity_id
            .as_ref()
            .map(|id| Reference::new(id.clone(), self.logical_name.clone()))
    }

    /// Whether a field with this name exists.
    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Get a field by name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// All fields, in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Set a field value.
    ///
    /// A new name appends a field whose type is inferred from the value. An
    /// existing name keeps its position and its originally inferred type;
    /// the raw value is stored as given and coerced at serialization time.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field::new(name, value)),
        }
    }

    /// Remove a field by name.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|f| f.name != name);
    }

    /// Populate fields from a response payload.
    ///
    /// Annotation keys (anything containing `@`) are skipped. A
    /// `_<name>_value` lookup key becomes a [`Reference`] field under the
    /// undecorated name, taking the target entity from the companion
    /// `lookuplogicalname` annotation. A key whose siblings look like a money
    /// field (`<name>_base` plus formatted-value annotations for both) is
    /// coerced to a number even when the payload carries it as a string.
    pub fn fill(&mut self, data: &Value) {
        let Some(map) = data.as_object() else {
            return;
        };

        for (key, value) in map {
            if key.contains('@') {
                continue;
            }

            if let Some(name) = key.strip_prefix('_').and_then(|k| k.strip_suffix("_value")) {
                let target = map
                    .get(&format!("{key}{LOOKUP_LOGICALNAME}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let id = value.as_str().unwrap_or_default();
                self.set(name, Reference::new(id, target));
                continue;
            }

            let looks_like_money = map
                .get(&format!("{key}_base"))
                .is_some_and(|v| !v.is_null())
                && map.contains_key(&format!("{key}{FORMATTED_VALUE}"))
                && map.contains_key(&format!("{key}_base{FORMATTED_VALUE}"));
            if looks_like_money {
                let amount = match value {
                    Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
                    Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
                    _ => f64::NAN,
                };
                self.set(key.clone(), amount);
            } else {
                self.set(key.clone(), FieldValue::from_json(value.clone()));
            }
        }
    }

    /// Serialize for a create or update request body.
    ///
    /// A lookup field holding a [`Reference`] with a non-empty id becomes an
    /// `@odata.bind` binding against the target's entity set; the binding key
    /// is the navigation property schema name resolved from metadata. Every
    /// other field is emitted under its own name, converted through its type.
    /// Missing metadata degrades to the raw field name rather than failing.
    pub fn to_json(&self, metadata: &MetadataSet) -> Value {
        let entity_def = metadata.get(&self.logical_name);
        if entity_def.is_none() && self.fields.iter().any(|f| f.field_type == FieldType::Lookup)
        {
            warn!(
                entity = %self.logical_name,
                "No metadata for entity; lookup fields serialize under their raw names"
            );
        }

        let mut body = serde_json::Map::new();
        for field in &self.fields {
            if field.field_type == FieldType::Lookup {
                if let (Some(def), Some(reference)) = (entity_def, field.value.as_reference()) {
                    if !reference.id.is_empty() {
                        let key = resolve_binding_name(def, &field.name, reference);
                        body.insert(
                            format!("{key}@odata.bind"),
                            Value::String(format!(
                                "/{}({})",
                                plural_name(&reference.logical_name),
                                format_guid(&reference.id)
                            )),
                        );
                        continue;
                    }
                }
            }
            body.insert(
                field.name.clone(),
                to_wire(&convert(field.value.clone(), field.field_type)),
            );
        }
        Value::Object(body)
    }

    /// Copy the named fields (those that exist) into a new entity with the
    /// same logical name and id.
    pub fn clone_by(&self, names: &[&str]) -> Entity {
        let mut clone = Entity::new(self.logical_name.clone());
        clone.entity_id = self.entity_id.clone();
        for name in names {
            if let Some(field) = self.get(name) {
                clone.fields.push(field.clone());
            }
        }
        clone
    }
}

/// Resolve the wire name for a lookup binding.
///
/// When exactly one metadata field targets the reference's entity, its schema
/// name wins. With several candidates the field's own name, `id` suffix
/// stripped, disambiguates. No match falls back to the raw field name.
fn resolve_binding_name(def: &EntityMetadata, field_name: &str, reference: &Reference) -> String {
    let candidates: Vec<_> = def.lookup_fields_targeting(&reference.logical_name).collect();
    let chosen = match candidates.len() {
        0 => None,
        1 => Some(candidates[0]),
        _ => {
            let trimmed = field_name.strip_suffix("id").unwrap_or(field_name);
            candidates.iter().find(|c| c.name == trimmed).copied()
        }
    };
    chosen
        .map(|c| c.schema_name.clone())
        .unwrap_or_else(|| field_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_metadata::FieldMetadata;

    const ACCOUNT_ID: &str = "9b6cb466-6ffc-e911-a812-000d3a5a1cae";

    fn lookup_meta(name: &str, schema: &str, target: &str) -> FieldMetadata {
        FieldMetadata {
            name: name.to_string(),
            schema_name: schema.to_string(),
            field_type: format!("mscrm.{target}"),
            lookup_entity_name: Some(target.to_string()),
            lookup_entity_primary_key: Some(format!("{target}id")),
        }
    }

    fn task_metadata() -> MetadataSet {
        MetadataSet::new(vec![EntityMetadata {
            name: "task".to_string(),
            primary_key: "activityid".to_string(),
            fields: vec![
                lookup_meta("regardingobjectid", "regardingobjectid_account_task", "account"),
                lookup_meta("ownerid", "ownerid", "systemuser"),
                lookup_meta("createdby", "createdby", "systemuser"),
            ],
        }])
    }

    #[test]
    fn test_set_infers_type_once() {
        let mut entity = Entity::new("account");
        entity.set("revenue", 125000.0);

        let field = entity.get("revenue").unwrap();
        assert_eq!(field.field_type(), FieldType::Decimal);

        // Reassignment through the entity stores the raw value but never
        // changes the inferred type.
        entity.set("revenue", "98000");
        let field = entity.get("revenue").unwrap();
        assert_eq!(field.field_type(), FieldType::Decimal);
        assert_eq!(field.get(), &FieldValue::String("98000".to_string()));
    }

    #[test]
    fn test_set_existing_keeps_count_and_order() {
        let mut entity = Entity::new("account");
        entity.set("name", "Contoso");
        entity.set("city", "Oslo");
        entity.set("name", "Fabrikam");

        assert_eq!(entity.fields().len(), 2);
        assert_eq!(entity.fields()[0].name(), "name");
        assert_eq!(
            entity.get("name").unwrap().get(),
            &FieldValue::String("Fabrikam".to_string())
        );
    }

    #[test]
    fn test_field_set_converts_through_type() {
        let mut field = Field::new("revenue", FieldValue::Number(10.0));
        field.set("12.5");
        assert_eq!(field.get(), &FieldValue::Number(12.5));

        field.set("a lot");
        match field.get() {
            FieldValue::Number(n) => assert!(n.is_nan()),
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn test_has_and_remove() {
        let mut entity = Entity::new("account");
        entity.set("name", "Contoso");
        entity.set("parent", FieldValue::Null);

        assert!(entity.has("name"));
        assert!(entity.has("parent"));
        assert!(!entity.get("parent").unwrap().has());

        entity.remove("name");
        assert!(!entity.has("name"));
        assert_eq!(entity.fields().len(), 1);
    }

    #[test]
    fn test_fill_skips_annotations_and_maps_lookups() {
        let mut entity = Entity::new("task");
        entity.fill(&serde_json::json!({
            "subject": "Call back",
            "subject@OData.Community.Display.V1.FormattedValue": "Call back",
            "_regardingobjectid_value": ACCOUNT_ID,
            "_regardingobjectid_value@Microsoft.Dynamics.CRM.lookuplogicalname": "account",
        }));

        assert_eq!(entity.fields().len(), 2);
        assert_eq!(
            entity.get("subject").unwrap().get(),
            &FieldValue::String("Call back".to_string())
        );

        let regarding = entity.get("regardingobjectid").unwrap();
        assert_eq!(regarding.field_type(), FieldType::Lookup);
        assert_eq!(
            regarding.get().as_reference().unwrap(),
            &Reference::new(ACCOUNT_ID, "account")
        );
    }

    #[test]
    fn test_fill_coerces_money_strings() {
        let mut entity = Entity::new("opportunity");
        entity.fill(&serde_json::json!({
            "budgetamount": "12500.5",
            "budgetamount_base": "12500.5",
            "budgetamount@OData.Community.Display.V1.FormattedValue": "$12,500.50",
            "budgetamount_base@OData.Community.Display.V1.FormattedValue": "$12,500.50",
        }));

        let amount = entity.get("budgetamount").unwrap();
        assert_eq!(amount.field_type(), FieldType::Decimal);
        assert_eq!(amount.get(), &FieldValue::Number(12500.5));

        // Without the money siblings the same string stays a string.
        let mut plain = Entity::new("opportunity");
        plain.fill(&serde_json::json!({"budgetamount": "12500.5"}));
        assert_eq!(
            plain.get("budgetamount").unwrap().field_type(),
            FieldType::String
        );
    }

    #[test]
    fn test_to_json_emits_binding_for_known_lookup() {
        let mut entity = Entity::new("task");
        entity.set("subject", "Call back");
        entity.set("regardingobjectid", Reference::new(ACCOUNT_ID, "account"));

        let body = entity.to_json(&task_metadata());
        assert_eq!(
            body,
            serde_json::json!({
                "subject": "Call back",
                "regardingobjectid_account_task@odata.bind":
                    format!("/accounts({ACCOUNT_ID})"),
            })
        );
    }

    #[test]
    fn test_to_json_binding_guid_is_canonicalized() {
        let mut entity = Entity::new("task");
        entity.set(
            "regardingobjectid",
            Reference::new("{9B6CB466-6FFC-E911-A812-000D3A5A1CAE}", "account"),
        );

        let body = entity.to_json(&task_metadata());
        assert_eq!(
            body["regardingobjectid_account_task@odata.bind"],
            serde_json::json!(format!("/accounts({ACCOUNT_ID})"))
        );
    }

    #[test]
    fn test_to_json_disambiguates_multiple_candidates() {
        // Two metadata fields target systemuser; the field's own name picks
        // the right one.
        let mut entity = Entity::new("task");
        entity.set("createdby", Reference::new(ACCOUNT_ID, "systemuser"));

        let body = entity.to_json(&task_metadata());
        assert!(body.get("createdby@odata.bind").is_some());
    }

    #[test]
    fn test_to_json_unresolvable_lookup_uses_raw_name() {
        // "owner" with the id suffix stripped matches no metadata field name,
        // so the binding falls back to the raw field name.
        let mut entity = Entity::new("task");
        entity.set("ownerid", Reference::new(ACCOUNT_ID, "systemuser"));

        let body = entity.to_json(&task_metadata());
        assert!(body.get("ownerid@odata.bind").is_some());
    }

    #[test]
    fn test_to_json_without_metadata_degrades_to_plain_value() {
        let mut entity = Entity::new("task");
        entity.set("regardingobjectid", Reference::new(ACCOUNT_ID, "account"));

        let body = entity.to_json(&MetadataSet::default());
        assert_eq!(
            body["regardingobjectid"],
            serde_json::json!({"Id": ACCOUNT_ID, "LogicalName": "account"})
        );
    }

    #[test]
    fn test_to_json_empty_reference_id_is_plain_value() {
        let mut entity = Entity::new("task");
        entity.set("regardingobjectid", Reference::new("", "account"));

        let body = entity.to_json(&task_metadata());
        assert!(body.get("regardingobjectid@odata.bind").is_none());
        assert_eq!(
            body["regardingobjectid"],
            serde_json::json!({"Id": "", "LogicalName": "account"})
        );
    }

    #[test]
    fn test_to_json_converts_through_field_type() {
        let mut entity = Entity::new("account");
        entity.set("revenue", 125000.0);
        entity.set("revenue", "98000"); // raw reassignment
        entity.set("name", "Contoso");

        let body = entity.to_json(&MetadataSet::default());
        assert_eq!(body["revenue"], serde_json::json!(98000.0));
        assert_eq!(body["name"], serde_json::json!("Contoso"));
    }

    #[test]
    fn test_clone_by() {
        let mut entity = Entity::new("account");
        entity.entity_id = Some(ACCOUNT_ID.to_string());
        entity.set("name", "Contoso");
        entity.set("city", "Oslo");
        entity.set("phone", "555-0100");

        let clone = entity.clone_by(&["name", "phone", "missing"]);
        assert_eq!(clone.logical_name, "account");
        assert_eq!(clone.entity_id.as_deref(), Some(ACCOUNT_ID));
        assert_eq!(clone.fields().len(), 2);
        assert!(clone.has("name"));
        assert!(!clone.has("city"));
    }

    #[test]
    fn test_entity_reference() {
        let mut entity = Entity::new("account");
        assert!(entity.entity_reference().is_none());

        entity.entity_id = Some(ACCOUNT_ID.to_string());
        let reference = entity.entity_reference().unwrap();
        assert_eq!(reference.id, ACCOUNT_ID);
        assert_eq!(reference.logical_name, "account");
    }

    #[test]
    fn test_with_fields() {
        let entity = Entity::with_fields("account", [("name", "Contoso"), ("city", "Oslo")]);
        assert_eq!(entity.fields().len(), 2);
        assert_eq!(entity.fields()[0].name(), "name");
    }
}
