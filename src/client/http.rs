// src/client/http.rs

//! HTTP environment client for the Content Management API
//!
//! Speaks JSON:API to the API and converts resources to the flat entity
//! shape of [`crate::schema`]: attributes are lifted to the top level and the
//! `item_type` / `fieldset` relationships become plain ids. Writes do the
//! reverse. Rate-limited (429) and server-side (5xx) failures are retried
//! with a growing delay; everything else is reported immediately.

use super::EnvironmentClient;
use crate::error::{Error, Result};
use crate::schema::{EntityId, EntityKind, Field, Fieldset, ItemType, Payload, Plugin};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Production endpoint of the Content Management API
pub const DEFAULT_API_URL: &str = "https://site-api.datocms.com";

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a request that keeps failing transiently
const MAX_RETRIES: u32 = 3;

/// Base retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Upper bound for a server-requested wait
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

const API_VERSION: &str = "3";
const JSON_API: &str = "application/vnd.api+json";

/// Relationships carried as plain ids in the flat entity shape
const FLAT_RELATIONSHIPS: [(&str, &str); 2] = [("item_type", "item_type"), ("fieldset", "fieldset")];

/// Environment client backed by the Content Management API
pub struct HttpEnvironment {
    client: Client,
    base_url: String,
    environment: String,
    max_retries: u32,
}

impl HttpEnvironment {
    /// Create a client for `environment` with default timeout and retries
    pub fn new(base_url: &str, token: &str, environment: &str) -> Result<Self> {
        Self::with_options(base_url, token, environment, HTTP_TIMEOUT, MAX_RETRIES)
    }

    /// Create with custom options
    pub fn with_options(
        base_url: &str,
        token: &str,
        environment: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("Invalid API URL '{}': {}", base_url, e)))?;

        if token.trim().is_empty() {
            return Err(Error::CredentialsError("API token is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| Error::CredentialsError(format!("API token is not a valid header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("x-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "x-environment",
            HeaderValue::from_str(environment).map_err(|e| {
                Error::ConfigError(format!("Invalid environment name '{}': {}", environment, e))
            })?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            environment: environment.to_string(),
            max_retries: max_retries.max(1),
        })
    }

    /// Issue a request, retrying transient failures
    ///
    /// Returns the decoded response body, or `Value::Null` for empty bodies.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let encoded = body.map(serde_json::to_vec).transpose()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("{} {} [{}] attempt {}", method, path, self.environment, attempt);

            let mut request = self.client.request(method.clone(), &url);
            if let Some(bytes) = &encoded {
                request = request.header(CONTENT_TYPE, JSON_API).body(bytes.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = Error::Http(e);
                    if err.is_transient() && attempt < self.max_retries {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * attempt as u64);
                        warn!("{} {} failed: {}, retrying in {:?}", method, path, err, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            let wait = retry_wait(response.headers(), attempt);
            let err = Error::Api {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            };
            if err.is_transient() && attempt < self.max_retries {
                warn!("{} {} returned HTTP {}, retrying in {:?}", method, path, status, wait);
                tokio::time::sleep(wait).await;
                continue;
            }
            return Err(err);
        }
    }

    /// Map an HTTP 404 from a lookup to `Error::NotFound`
    fn not_found(&self, err: Error, kind: EntityKind, key: &str) -> Error {
        match err {
            Error::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                Error::not_found(kind.as_str(), key, &self.environment)
            }
            other => other,
        }
    }

    async fn get_one<T: DeserializeOwned>(&self, kind: EntityKind, path: &str, key: &str) -> Result<T> {
        let document = self
            .send(Method::GET, path, None)
            .await
            .map_err(|e| self.not_found(e, kind, key))?;
        decode_resource(document_data(&document)?)
    }

    async fn get_many<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let document = self.send(Method::GET, path, None).await?;
        match document_data(&document)? {
            Value::Array(resources) => resources.iter().map(decode_resource::<T>).collect(),
            other => Err(Error::ParseError(format!(
                "Expected a resource array from {}, got {}",
                path, other
            ))),
        }
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        kind: EntityKind,
        path: &str,
        id: Option<&EntityId>,
        payload: Payload,
    ) -> Result<T> {
        let body = encode_resource(kind, id, payload);
        let document = self.send(method, path, Some(&body)).await?;
        decode_resource(document_data(&document)?)
    }

    async fn destroy(&self, kind: EntityKind, path: &str, id: &EntityId) -> Result<()> {
        self.send(Method::DELETE, path, None)
            .await
            .map_err(|e| self.not_found(e, kind, id.as_str()))?;
        Ok(())
    }
}

/// How long to wait before retrying a failed response
///
/// Honours `X-RateLimit-Reset` and `Retry-After` (both in seconds), falling
/// back to a linearly growing delay.
fn retry_wait(headers: &HeaderMap, attempt: u32) -> Duration {
    let requested = ["x-ratelimit-reset", "retry-after"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<u64>().ok());

    match requested {
        Some(secs) => Duration::from_secs(secs).min(MAX_RETRY_WAIT),
        None => Duration::from_millis(RETRY_DELAY_MS * attempt as u64),
    }
}

fn document_data(document: &Value) -> Result<&Value> {
    document
        .get("data")
        .ok_or_else(|| Error::ParseError("Response document has no 'data' member".to_string()))
}

/// Flatten a JSON:API resource into the entity shape and deserialize it
fn decode_resource<T: DeserializeOwned>(resource: &Value) -> Result<T> {
    Ok(serde_json::from_value(flatten_resource(resource)?)?)
}

fn flatten_resource(resource: &Value) -> Result<Value> {
    let id = resource
        .get("id")
        .cloned()
        .ok_or_else(|| Error::ParseError(format!("Resource without id: {}", resource)))?;

    let mut flat = resource
        .get("attributes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    flat.insert("id".to_string(), id);

    if let Some(relationships) = resource.get("relationships").and_then(Value::as_object) {
        for (name, _) in FLAT_RELATIONSHIPS {
            if let Some(relationship) = relationships.get(name) {
                let target = relationship
                    .get("data")
                    .and_then(|data| data.get("id"))
                    .cloned()
                    .unwrap_or(Value::Null);
                flat.insert(name.to_string(), target);
            }
        }
    }

    Ok(Value::Object(flat))
}

/// Wrap a flat payload into a JSON:API document
///
/// The owning `item_type` is implied by the request path and never sent;
/// a `fieldset` key becomes a relationship (null detaches the field).
fn encode_resource(kind: EntityKind, id: Option<&EntityId>, mut attributes: Payload) -> Value {
    attributes.remove("id");
    attributes.remove("item_type");

    let mut relationships = Map::new();
    if let Some(fieldset) = attributes.remove("fieldset") {
        let (_, resource_type) = FLAT_RELATIONSHIPS[1];
        let data = match fieldset {
            Value::String(fieldset_id) => json!({"type": resource_type, "id": fieldset_id}),
            _ => Value::Null,
        };
        relationships.insert("fieldset".to_string(), json!({ "data": data }));
    }

    let mut data = Map::new();
    if let Some(id) = id {
        data.insert("id".to_string(), json!(id.as_str()));
    }
    data.insert("type".to_string(), json!(kind.resource_type()));
    data.insert("attributes".to_string(), Value::Object(attributes));
    if !relationships.is_empty() {
        data.insert("relationships".to_string(), Value::Object(relationships));
    }

    json!({ "data": data })
}

#[async_trait]
impl EnvironmentClient for HttpEnvironment {
    fn environment(&self) -> &str {
        &self.environment
    }

    async fn list_item_types(&self) -> Result<Vec<ItemType>> {
        self.get_many("/item-types").await
    }

    async fn find_item_type(&self, key: &str) -> Result<ItemType> {
        self.get_one(EntityKind::ItemType, &format!("/item-types/{}", key), key)
            .await
    }

    async fn create_item_type(&self, payload: Payload) -> Result<ItemType> {
        self.write(Method::POST, EntityKind::ItemType, "/item-types", None, payload)
            .await
    }

    async fn update_item_type(&self, id: &EntityId, payload: Payload) -> Result<ItemType> {
        let path = format!("/item-types/{}", id);
        self.write(Method::PUT, EntityKind::ItemType, &path, Some(id), payload)
            .await
    }

    async fn delete_item_type(&self, id: &EntityId) -> Result<()> {
        self.destroy(EntityKind::ItemType, &format!("/item-types/{}", id), id)
            .await
    }

    async fn list_fields(&self, item_type: &str) -> Result<Vec<Field>> {
        self.get_many(&format!("/item-types/{}/fields", item_type))
            .await
    }

    async fn find_field(&self, id: &EntityId) -> Result<Field> {
        self.get_one(EntityKind::Field, &format!("/fields/{}", id), id.as_str())
            .await
    }

    async fn create_field(&self, item_type: &str, payload: Payload) -> Result<Field> {
        let path = format!("/item-types/{}/fields", item_type);
        self.write(Method::POST, EntityKind::Field, &path, None, payload)
            .await
    }

    async fn update_field(&self, id: &EntityId, payload: Payload) -> Result<Field> {
        let path = format!("/fields/{}", id);
        self.write(Method::PUT, EntityKind::Field, &path, Some(id), payload)
            .await
    }

    async fn delete_field(&self, id: &EntityId) -> Result<()> {
        self.destroy(EntityKind::Field, &format!("/fields/{}", id), id)
            .await
    }

    async fn list_fieldsets(&self, item_type: &str) -> Result<Vec<Fieldset>> {
        self.get_many(&format!("/item-types/{}/fieldsets", item_type))
            .await
    }

    async fn find_fieldset(&self, id: &EntityId) -> Result<Fieldset> {
        self.get_one(EntityKind::Fieldset, &format!("/fieldsets/{}", id), id.as_str())
            .await
    }

    async fn create_fieldset(&self, item_type: &str, payload: Payload) -> Result<Fieldset> {
        let path = format!("/item-types/{}/fieldsets", item_type);
        self.write(Method::POST, EntityKind::Fieldset, &path, None, payload)
            .await
    }

    async fn update_fieldset(&self, id: &EntityId, payload: Payload) -> Result<Fieldset> {
        let path = format!("/fieldsets/{}", id);
        self.write(Method::PUT, EntityKind::Fieldset, &path, Some(id), payload)
            .await
    }

    async fn delete_fieldset(&self, id: &EntityId) -> Result<()> {
        self.destroy(EntityKind::Fieldset, &format!("/fieldsets/{}", id), id)
            .await
    }

    async fn list_plugins(&self) -> Result<Vec<Plugin>> {
        self.get_many("/plugins").await
    }

    async fn find_plugin(&self, id: &EntityId) -> Result<Plugin> {
        self.get_one(EntityKind::Plugin, &format!("/plugins/{}", id), id.as_str())
            .await
    }

    async fn create_plugin(&self, payload: Payload) -> Result<Plugin> {
        self.write(Method::POST, EntityKind::Plugin, "/plugins", None, payload)
            .await
    }

    async fn update_plugin(&self, id: &EntityId, payload: Payload) -> Result<Plugin> {
        let path = format!("/plugins/{}", id);
        self.write(Method::PUT, EntityKind::Plugin, &path, Some(id), payload)
            .await
    }

    async fn delete_plugin(&self, id: &EntityId) -> Result<()> {
        self.destroy(EntityKind::Plugin, &format!("/plugins/{}", id), id)
            .await
    }
}
