//! The CRUD and relationship operations.
//!
//! Every operation builds a path under the service base URL, runs one
//! authenticated exchange through the manager, and interprets the outcome.
//! Write operations serialize their body once and send it on both handshake
//! rounds; the server only reads it on the authenticated one.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

use crm_auth::RequestShape;
use crm_client::RequestMethod;

use crate::entity::{Entity, Reference};
use crate::error::{Error, ErrorKind, Result};
use crate::manager::{CrmManager, SendOutcome};
use crate::naming::{format_guid, is_empty_guid, plural_name};

/// Entity name attribute in a FetchXml document.
static FETCH_ENTITY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<[eE]ntity\s+[nN]ame="([^"]+)""#).unwrap());

const ANNOTATIONS_PREFER: (&str, &str) = ("Prefer", "odata.include-annotations=\"*\"");

fn shape(method: RequestMethod, headers: Vec<(String, String)>, body: Option<String>) -> RequestShape {
    RequestShape {
        method,
        headers,
        body,
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), "application/json".to_string())]
}

impl CrmManager {
    /// Fetch one record by reference. `Ok(None)` means the service answered
    /// success without a body.
    #[instrument(skip(self), fields(entity = %reference.logical_name))]
    pub async fn retrieve(&self, reference: &Reference) -> Result<Option<Entity>> {
        let path = format!(
            "/{}({})",
            plural_name(&reference.logical_name),
            format_guid(&reference.id)
        );
        let outcome = self
            .send_request(&path, |_, _| {
                shape(
                    RequestMethod::Get,
                    vec![(ANNOTATIONS_PREFER.0.to_string(), ANNOTATIONS_PREFER.1.to_string())],
                    None,
                )
            })
            .await?;

        match outcome {
            SendOutcome::Json(body) => {
                let mut entity = Entity::new(reference.logical_name.clone());
                entity.entity_id = Some(reference.id.clone());
                entity.fill(&body);
                Ok(Some(entity))
            }
            _ => Ok(None),
        }
    }

    /// Query records with OData query options (the part after `?`).
    #[instrument(skip(self, query), fields(entity = logical_name))]
    pub async fn retrieve_query(&self, logical_name: &str, query: &str) -> Result<Vec<Entity>> {
        let path = format!("/{}?{}", plural_name(logical_name), query);
        let outcome = self
            .send_request(&path, |_, _| {
                shape(
                    RequestMethod::Get,
                    vec![(ANNOTATIONS_PREFER.0.to_string(), ANNOTATIONS_PREFER.1.to_string())],
                    None,
                )
            })
            .await?;

        Ok(match outcome {
            SendOutcome::Json(body) => collect_entities(logical_name, &body),
            _ => Vec::new(),
        })
    }

    /// Query records with a FetchXml document, carried in the `fetchXml`
    /// query parameter's header form.
    #[instrument(skip(self, fetch_xml))]
    pub async fn retrieve_fetch_xml(&self, fetch_xml: &str) -> Result<Vec<Entity>> {
        let logical_name = FETCH_ENTITY_NAME
            .captures(fetch_xml)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument(
                    "fetch xml names no entity".to_string(),
                ))
            })?;
        let header_value: String = fetch_xml.replace(['\r', '\n'], "");

        let path = format!("/{}", plural_name(&logical_name));
        let outcome = self
            .send_request(&path, move |_, _| {
                shape(
                    RequestMethod::Get,
                    vec![
                        (ANNOTATIONS_PREFER.0.to_string(), ANNOTATIONS_PREFER.1.to_string()),
                        ("FetchXml".to_string(), header_value.clone()),
                    ],
                    None,
                )
            })
            .await?;

        Ok(match outcome {
            SendOutcome::Json(body) => collect_entities(&logical_name, &body),
            _ => Vec::new(),
        })
    }

    /// Create a record. On success the service-assigned id is written back
    /// into `entity.entity_id` and `true` is returned.
    #[instrument(skip(self, entity), fields(entity = %entity.logical_name))]
    pub async fn create(&self, entity: &mut Entity) -> Result<bool> {
        let path = format!("/{}", plural_name(&entity.logical_name));
        let body = entity.to_json(self.metadata()).to_string();
        let outcome = self
            .send_request(&path, move |_, _| {
                shape(RequestMethod::Post, json_headers(), Some(body.clone()))
            })
            .await?;

        match outcome {
            SendOutcome::Created { id } => {
                entity.entity_id = Some(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Update a record in place. Requires `entity.entity_id`. Returns `true`
    /// when the service confirmed with a record header.
    #[instrument(skip(self, entity), fields(entity = %entity.logical_name))]
    pub async fn update(&self, entity: &Entity) -> Result<bool> {
        let id = entity.entity_id.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument(
                "update requires an entity id".to_string(),
            ))
        })?;

        let path = format!("/{}({})", plural_name(&entity.logical_name), format_guid(id));
        let body = entity.to_json(self.metadata()).to_string();
        let outcome = self
            .send_request(&path, move |_, _| {
                shape(RequestMethod::Patch, json_headers(), Some(body.clone()))
            })
            .await?;

        Ok(matches!(outcome, SendOutcome::Created { .. }))
    }

    /// Route to update when the entity carries a usable id, otherwise
    /// create. A missing, empty, or nil-GUID id means create.
    pub async fn create_or_update(&self, entity: &mut Entity) -> Result<bool> {
        match entity.entity_id.clone() {
            Some(id) if !is_empty_guid(&id) => self.update(entity).await,
            _ => self.create(entity).await,
        }
    }

    /// Delete a record. Returns `true` when the service acknowledged with an
    /// empty-body success.
    #[instrument(skip(self), fields(entity = %reference.logical_name))]
    pub async fn delete(&self, reference: &Reference) -> Result<bool> {
        let path = format!(
            "/{}({})",
            plural_name(&reference.logical_name),
            format_guid(&reference.id)
        );
        let outcome = self
            .send_request(&path, |_, _| {
                shape(RequestMethod::Delete, Vec::new(), None)
            })
            .await?;
        Ok(matches!(outcome, SendOutcome::NoContent))
    }

    /// Set a record's state and status codes.
    #[instrument(skip(self), fields(entity = %reference.logical_name))]
    pub async fn set_state(&self, reference: &Reference, state: i32, status: i32) -> Result<bool> {
        let path = format!(
            "/{}({})",
            plural_name(&reference.logical_name),
            format_guid(&reference.id)
        );
        let body =
            serde_json::json!({"statecode": state, "statuscode": status}).to_string();
        let outcome = self
            .send_request(&path, move |_, _| {
                shape(RequestMethod::Patch, json_headers(), Some(body.clone()))
            })
            .await?;
        Ok(matches!(outcome, SendOutcome::Created { .. }))
    }

    /// Associate two records through a named relationship.
    #[instrument(skip(self), fields(relationship = relationship_name))]
    pub async fn associate(
        &self,
        source: &Reference,
        target: &Reference,
        relationship_name: &str,
    ) -> Result<bool> {
        let path = format!(
            "/{}({})/{}/$ref",
            plural_name(&source.logical_name),
            format_guid(&source.id),
            relationship_name
        );
        let body = serde_json::json!({
            "@odata.id": format!(
                "{}/{}({})",
                self.connection().url(),
                plural_name(&target.logical_name),
                format_guid(&target.id)
            )
        })
        .to_string();
        let outcome = self
            .send_request(&path, move |_, _| {
                shape(RequestMethod::Post, json_headers(), Some(body.clone()))
            })
            .await?;
        Ok(matches!(outcome, SendOutcome::NoContent))
    }
}

/// Build entities from a query result's `value` array. Each row's primary
/// key column (`<name>id`) is promoted to `entity_id` and removed from the
/// field list.
fn collect_entities(logical_name: &str, body: &serde_json::Value) -> Vec<Entity> {
    let Some(rows) = body.get("value").and_then(serde_json::Value::as_array) else {
        return Vec::new();
    };

    let id_field = format!("{logical_name}id");
    rows.iter()
        .map(|row| {
            let mut entity = Entity::new(logical_name);
            entity.fill(row);
            if let Some(field) = entity.get(&id_field) {
                let id = field.get().to_string();
                if !id.is_empty() {
                    entity.entity_id = Some(id);
                    entity.remove(&id_field);
                }
            }
            entity
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::manager::CrmConnection;

    const ACCOUNT_ID: &str = "9b6cb466-6ffc-e911-a812-000d3a5a1cae";
    const CONTACT_ID: &str = "11111111-2222-3333-4444-555555555555";

    fn challenge_header() -> String {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"NTLMSSP\0");
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&[0u8; 8]);
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&[0x11; 8]);
        format!("NTLM {}", BASE64.encode(&raw))
    }

    async fn mount_challenge(server: &MockServer) {
        Mock::given(header("Connection", "keep-alive"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", challenge_header().as_str()),
            )
            .mount(server)
            .await;
    }

    fn manager_for(server: &MockServer) -> CrmManager {
        CrmManager::new(CrmConnection::new(
            server.uri(),
            "jdoe",
            "hunter2",
            "CONTOSO",
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_fills_entity() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts({ACCOUNT_ID})")))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "@odata.context": "ignored",
                "name": "Contoso",
                "_primarycontactid_value": CONTACT_ID,
                "_primarycontactid_value@Microsoft.Dynamics.CRM.lookuplogicalname": "contact",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let entity = manager
            .retrieve(&Reference::new(ACCOUNT_ID, "account"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entity.logical_name, "account");
        assert_eq!(entity.entity_id.as_deref(), Some(ACCOUNT_ID));
        assert_eq!(
            entity.get("name").unwrap().get().as_str(),
            Some("Contoso")
        );
        assert_eq!(
            entity.get("primarycontactid").unwrap().get().as_reference(),
            Some(&Reference::new(CONTACT_ID, "contact"))
        );
    }

    #[tokio::test]
    async fn test_retrieve_braced_id_is_canonicalized_in_path() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts({ACCOUNT_ID})")))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let found = manager
            .retrieve(&Reference::new(
                "{9B6CB466-6FFC-E911-A812-000D3A5A1CAE}",
                "account",
            ))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_retrieve_query_promotes_primary_key() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("GET"))
            .and(path("/contacts"))
            .and(query_param("$select", "fullname"))
            .and(header("Prefer", "odata.include-annotations=\"*\""))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {"contactid": CONTACT_ID, "fullname": "Jo Doe"},
                    {"fullname": "No Id"},
                ]
            })))
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let entities = manager
            .retrieve_query("contact", "$select=fullname")
            .await
            .unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_id.as_deref(), Some(CONTACT_ID));
        assert!(!entities[0].has("contactid"));
        assert!(entities[1].entity_id.is_none());
    }

    #[tokio::test]
    async fn test_retrieve_fetch_xml() {
        let fetch = "<fetch>\n  <entity name=\"opportunity\">\n    <attribute name=\"name\"/>\n  </entity>\n</fetch>";

        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("GET"))
            .and(path("/opportunities"))
            .and(header(
                "FetchXml",
                "<fetch>  <entity name=\"opportunity\">    <attribute name=\"name\"/>  </entity></fetch>",
            ))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"name": "Big deal"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let entities = manager.retrieve_fetch_xml(fetch).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].logical_name, "opportunity");
    }

    #[tokio::test]
    async fn test_retrieve_fetch_xml_without_entity_name_is_an_error() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        let err = manager
            .retrieve_fetch_xml("<fetch><attribute name=\"x\"/></fetch>")
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
        // Rejected before any request goes out.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("POST"))
            .and(path("/accounts"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(serde_json::json!({"name": "Contoso"})))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204).insert_header(
                "OData-EntityId",
                format!("{}/accounts({ACCOUNT_ID})", server.uri()).as_str(),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let mut entity = Entity::with_fields("account", [("name", "Contoso")]);
        let created = manager.create(&mut entity).await.unwrap();

        assert!(created);
        assert_eq!(entity.entity_id.as_deref(), Some(ACCOUNT_ID));
    }

    #[tokio::test]
    async fn test_update_patches_record() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/accounts({ACCOUNT_ID})")))
            .and(body_json(serde_json::json!({"name": "Fabrikam"})))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204).insert_header(
                "OData-EntityId",
                format!("{}/accounts({ACCOUNT_ID})", server.uri()).as_str(),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let mut entity = Entity::with_fields("account", [("name", "Fabrikam")]);
        entity.entity_id = Some(ACCOUNT_ID.to_string());

        assert!(manager.update(&entity).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_without_id_is_an_error() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);
        let entity = Entity::with_fields("account", [("name", "Fabrikam")]);

        let err = manager.update(&entity).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_create_or_update_routes_nil_guid_to_create() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("POST"))
            .and(path("/accounts"))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204).insert_header(
                "OData-EntityId",
                format!("{}/accounts({ACCOUNT_ID})", server.uri()).as_str(),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let mut entity = Entity::with_fields("account", [("name", "Contoso")]);
        entity.entity_id = Some("00000000-0000-0000-0000-000000000000".to_string());

        assert!(manager.create_or_update(&mut entity).await.unwrap());
        assert_eq!(entity.entity_id.as_deref(), Some(ACCOUNT_ID));
    }

    #[tokio::test]
    async fn test_create_or_update_routes_real_guid_to_update() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/accounts({ACCOUNT_ID})")))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let mut entity = Entity::with_fields("account", [("name", "Contoso")]);
        entity.entity_id = Some(ACCOUNT_ID.to_string());

        // No OData-EntityId header on the response, so update reports false.
        assert!(!manager.create_or_update(&mut entity).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("DELETE"))
            .and(path(format!("/accounts({ACCOUNT_ID})")))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        assert!(manager
            .delete(&Reference::new(ACCOUNT_ID, "account"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_set_state_body() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/incidents({ACCOUNT_ID})")))
            .and(body_json(serde_json::json!({"statecode": 1, "statuscode": 5})))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204).insert_header(
                "OData-EntityId",
                format!("{}/incidents({ACCOUNT_ID})", server.uri()).as_str(),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        assert!(manager
            .set_state(&Reference::new(ACCOUNT_ID, "incident"), 1, 5)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_associate_builds_ref_body() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/accounts({ACCOUNT_ID})/account_tasks/$ref"
            )))
            .and(body_json(serde_json::json!({
                "@odata.id": format!("{}/tasks({CONTACT_ID})", server.uri()),
            })))
            .and(header("Connection", "close"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server);
        let associated = manager
            .associate(
                &Reference::new(ACCOUNT_ID, "account"),
                &Reference::new(CONTACT_ID, "task"),
                "account_tasks",
            )
            .await
            .unwrap();
        assert!(associated);
    }

    #[test]
    fn test_collect_entities_tolerates_missing_value_array() {
        assert!(collect_entities("account", &serde_json::json!({})).is_empty());
        assert!(collect_entities("account", &serde_json::json!({"value": 3})).is_empty());
    }
}
