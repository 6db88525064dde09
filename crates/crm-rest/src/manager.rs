//! The connection manager: holds credentials, schema, and the request
//! orchestration every operation goes through.

use std::collections::HashMap;

use tracing::{debug, error, info, instrument};
use url::Url;

use crm_auth::{ntlm_handshake, HandshakeRound, NtlmCredentials, RequestShape, ServerChallenge};
use crm_client::{ClientConfig, HttpClient};
use crm_metadata::MetadataSet;

use crate::error::{Error, ErrorKind, Result};

/// Connection coordinates for one organization service.
#[derive(Clone)]
pub struct CrmConnection {
    url: String,
    username: String,
    password: String,
    domain: String,
}

impl CrmConnection {
    /// Describe a connection. A trailing slash on the URL is dropped so path
    /// concatenation stays predictable.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        let mut url = url.into();
        while url.ends_with('/') {
            url.pop();
        }
        Self {
            url,
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        }
    }

    /// The service base URL, without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The account username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The account domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl std::fmt::Debug for CrmConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConnection")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("domain", &self.domain)
            .finish()
    }
}

/// What a successful exchange amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Empty 2xx body with an `odata-entityid` header: a record was created.
    Created { id: String },
    /// Empty 2xx body without the header: the service acknowledged silently.
    NoContent,
    /// A 2xx body parsed as JSON.
    Json(serde_json::Value),
}

type ErrorObserver = Box<dyn Fn(&Error) + Send + Sync>;

/// The client: one instance per connection.
///
/// `connect` loads the entity schema once; operations afterwards only read
/// it, so everything but `connect` borrows the manager immutably.
pub struct CrmManager {
    connection: CrmConnection,
    credentials: NtlmCredentials,
    http: HttpClient,
    metadata: MetadataSet,
    service_headers: HashMap<String, String>,
    on_error: Vec<ErrorObserver>,
    on_connection_error: Vec<ErrorObserver>,
}

impl CrmManager {
    /// Create a manager with default HTTP settings.
    pub fn new(connection: CrmConnection) -> Result<Self> {
        Self::with_config(connection, ClientConfig::default())
    }

    /// Create a manager with explicit HTTP settings.
    ///
    /// The NTLM workstation name is taken from the service URL's host, which
    /// is what the server expects to see from a web client.
    pub fn with_config(connection: CrmConnection, config: ClientConfig) -> Result<Self> {
        let host = Url::parse(&connection.url)?
            .host_str()
            .unwrap_or_default()
            .to_string();
        let credentials = NtlmCredentials::new(
            &connection.username,
            &connection.password,
            &connection.domain,
            host,
        );
        let http = HttpClient::new(config)?;

        let mut manager = Self {
            connection,
            credentials,
            http,
            metadata: MetadataSet::default(),
            service_headers: HashMap::new(),
            on_error: Vec::new(),
            on_connection_error: Vec::new(),
        };
        // Failures are observable even when the caller registers nothing.
        manager.on_error(|err| error!(error = %err, "CRM request failed"));
        manager.on_connection_error(|err| error!(error = %err, "CRM connection failed"));
        Ok(manager)
    }

    /// Register an observer for operation failures.
    pub fn on_error(&mut self, observer: impl Fn(&Error) + Send + Sync + 'static) {
        self.on_error.push(Box::new(observer));
    }

    /// Register an observer for connection-phase failures.
    pub fn on_connection_error(&mut self, observer: impl Fn(&Error) + Send + Sync + 'static) {
        self.on_connection_error.push(Box::new(observer));
    }

    /// The connection this manager was built for.
    pub fn connection(&self) -> &CrmConnection {
        &self.connection
    }

    /// The entity schema loaded by [`connect`](Self::connect).
    pub fn metadata(&self) -> &MetadataSet {
        &self.metadata
    }

    /// Non-framing headers from the `connect` response, kept for diagnostics.
    pub fn service_headers(&self) -> &HashMap<String, String> {
        &self.service_headers
    }

    /// Whether [`connect`](Self::connect) has loaded a schema.
    pub fn is_connected(&self) -> bool {
        !self.metadata.is_empty()
    }

    /// Authenticate and load the entity schema.
    ///
    /// Runs a full handshake against the `$metadata` document, stores the
    /// parsed schema and the response headers (minus the per-exchange framing
    /// ones). Operations work without it, but lookup serialization degrades
    /// to raw field names until a schema is loaded.
    #[instrument(skip(self), fields(url = %self.connection.url))]
    pub async fn connect(&mut self) -> Result<()> {
        match self.load_metadata().await {
            Ok(()) => Ok(()),
            Err(err) => {
                for observer in &self.on_connection_error {
                    observer(&err);
                }
                Err(err)
            }
        }
    }

    async fn load_metadata(&mut self) -> Result<()> {
        let url = format!("{}/$metadata#EntityDefinitions/Attributes", self.connection.url);
        let response =
            ntlm_handshake(&self.http, &url, &self.credentials, |_, _| RequestShape::default())
                .await?;

        if !response.is_success() {
            return Err(Error::new(ErrorKind::Service {
                status: response.status(),
                message: response.body().to_string(),
            }));
        }

        self.service_headers = response
            .headers()
            .iter()
            .filter(|(name, _)| {
                !matches!(name.as_str(), "content-type" | "content-length" | "connection")
            })
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let entities = crm_metadata::parse_metadata(response.body())?;
        self.metadata = MetadataSet::new(entities);
        info!(entities = self.metadata.len(), "Connected");
        Ok(())
    }

    /// Run one authenticated exchange against `path` and interpret the
    /// response. Operation failures are reported to the error observers
    /// before the error is returned.
    pub(crate) async fn send_request<F>(&self, path: &str, shaper: F) -> Result<SendOutcome>
    where
        F: Fn(HandshakeRound, Option<&ServerChallenge>) -> RequestShape,
    {
        match self.try_send(path, shaper).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                for observer in &self.on_error {
                    observer(&err);
                }
                Err(err)
            }
        }
    }

    async fn try_send<F>(&self, path: &str, shaper: F) -> Result<SendOutcome>
    where
        F: Fn(HandshakeRound, Option<&ServerChallenge>) -> RequestShape,
    {
        let url = format!("{}{}", self.connection.url, path);
        let response = ntlm_handshake(&self.http, &url, &self.credentials, shaper).await?;

        if !response.is_success() {
            return Err(Error::new(ErrorKind::Service {
                status: response.status(),
                message: response.body().to_string(),
            }));
        }

        if response.body().is_empty() {
            if let Some(entity_header) = response.header("odata-entityid") {
                let id = extract_entity_id(entity_header)?;
                debug!(%id, "Record created");
                return Ok(SendOutcome::Created { id });
            }
            return Ok(SendOutcome::NoContent);
        }

        let value = serde_json::from_str(response.body()).map_err(|e| {
            Error::with_source(
                ErrorKind::InvalidResponse(format!("body is not JSON: {e}")),
                e,
            )
        })?;
        Ok(SendOutcome::Json(value))
    }
}

impl std::fmt::Debug for CrmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmManager")
            .field("connection", &self.connection)
            .field("entities", &self.metadata.len())
            .finish()
    }
}

/// Pull the record id out of an `odata-entityid` header, which looks like
/// `https://host/api/data/v9.1/accounts(9b6cb466-...)`.
fn extract_entity_id(header: &str) -> Result<String> {
    header
        .split('(')
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(ErrorKind::InvalidResponse(format!(
                "odata-entityid header has no record id: {header}"
            )))
        })
}
