//! Remote source backed by a JSON:API server.
//!
//! Uses `reqwest` for HTTP. Resource paths are derived from the schema:
//! `/{plural}`, `/{plural}/{remoteId}` and
//! `/{plural}/{remoteId}/{relationship}`, optionally under a namespace.

use super::{Capabilities, Source};
use crate::error::{SyncError, SyncResult};
use crate::query::{FilterOp, Query, QueryExpression, QueryResult, SortOrder};
use crate::serializer::{Document, JsonApiSerializer, filter_param};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_model::{KeyMap, Schema};
use tether_types::{Operation, Record, RecordIdentity, Transform};
use tracing::{debug, info};

/// Remote source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the API (e.g. `https://api.example.com`).
    pub host: String,
    /// Path segment inserted between the host and resource paths.
    pub namespace: Option<String>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Record key holding the server-assigned id.
    pub resource_key: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3000".to_string(),
            namespace: None,
            timeout_ms: 30_000,
            resource_key: "remoteId".to_string(),
        }
    }
}

impl RemoteConfig {
    fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        match self.namespace.as_deref().map(|n| n.trim_matches('/')) {
            Some(namespace) if !namespace.is_empty() => format!("{host}/{namespace}"),
            _ => host.to_string(),
        }
    }

    fn client(&self) -> SyncResult<Client> {
        Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))
    }
}

/// Proxies a JSON:API server. Holds no record state of its own.
pub struct RemoteSource {
    config: RemoteConfig,
    client: Client,
    serializer: JsonApiSerializer,
}

impl RemoteSource {
    pub fn new(config: RemoteConfig, schema: Arc<Schema>, keys: Arc<KeyMap>) -> SyncResult<Self> {
        let client = config.client()?;
        let serializer = JsonApiSerializer::new(schema, keys, config.resource_key.clone());
        Ok(Self {
            config,
            client,
            serializer,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn serializer(&self) -> &JsonApiSerializer {
        &self.serializer
    }

    /// Fetches the schema descriptor served at `{host}/schema`.
    pub async fn fetch_schema(config: &RemoteConfig) -> SyncResult<Schema> {
        let url = format!("{}/schema", config.host.trim_end_matches('/'));
        debug!("Fetching schema from {}", url);
        let response = config
            .client()?
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        let body = checked_body(response).await?;
        let descriptor = body.ok_or_else(|| SyncError::Source("empty schema response".into()))?;
        let schema = Schema::from_value(descriptor)?;
        info!("Fetched schema with {} model(s)", schema.models.len());
        Ok(schema)
    }

    fn collection_url(&self, record_type: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url(),
            self.serializer.resource_type(record_type)
        )
    }

    /// URL of a paired record, or `None` when it has no remote id yet.
    fn record_url(&self, identity: &RecordIdentity) -> Option<String> {
        let remote_id = self.serializer.resource_id(identity)?;
        Some(format!(
            "{}/{}",
            self.collection_url(&identity.record_type),
            remote_id
        ))
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> SyncResult<Option<Value>> {
        debug!("{} {}", method, url);
        let mut builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json");
        if !params.is_empty() {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/vnd.api+json")
                .body(serde_json::to_vec(&body)?);
        }
        let response = builder.send().await.map_err(transport_error)?;
        checked_body(response).await
    }

    async fn get_document(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> SyncResult<Document> {
        match self.request(Method::GET, url, params, None).await? {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Ok(Document::default()),
        }
    }

    /// Runs a query against the server.
    ///
    /// Returns the answer together with the operations that bring a local
    /// cache in line with it. A record that has not been paired with a
    /// remote id is never fetched.
    async fn fetch(&self, query: &Query) -> SyncResult<(QueryResult, Vec<Operation>)> {
        match &query.expression {
            QueryExpression::FindRecord { record } => {
                let Some(url) = self.record_url(record) else {
                    debug!(record = %record, "not paired with a remote id; nothing to fetch");
                    return Ok((QueryResult::Single(None), Vec::new()));
                };
                let document = self.get_document(&url, &[]).await?;
                let records = self.serializer.deserialize_document(&document)?;
                let operations = records.iter().cloned().map(Operation::AddRecord).collect();
                Ok((QueryResult::Single(records.into_iter().next()), operations))
            }

            QueryExpression::FindRecords {
                record_type,
                filter,
                sort,
                page,
            } => {
                let record_type = record_type.as_deref().ok_or_else(|| {
                    SyncError::Validation("remote queries need a record type".into())
                })?;
                let mut params = Vec::new();
                for spec in filter {
                    if spec.op != FilterOp::Equal {
                        return Err(SyncError::Validation(format!(
                            "remote filter on {} supports equality only",
                            spec.attribute
                        )));
                    }
                    params.push(filter_param(&spec.attribute, &spec.value));
                }
                if !sort.is_empty() {
                    let terms: Vec<String> = sort
                        .iter()
                        .map(|s| match s.order {
                            SortOrder::Asc => s.attribute.clone(),
                            SortOrder::Desc => format!("-{}", s.attribute),
                        })
                        .collect();
                    params.push(("sort".to_string(), terms.join(",")));
                }
                if let Some(page) = page {
                    params.push(("page[offset]".to_string(), page.offset.to_string()));
                    if let Some(limit) = page.limit {
                        params.push(("page[limit]".to_string(), limit.to_string()));
                    }
                }

                let document = self
                    .get_document(&self.collection_url(record_type), &params)
                    .await?;
                let records = self.serializer.deserialize_document(&document)?;
                let primary = match &document.data {
                    Value::Array(items) => items.len(),
                    Value::Null => 0,
                    _ => 1,
                };
                let operations = records.iter().cloned().map(Operation::AddRecord).collect();
                let result = records.into_iter().take(primary).collect();
                Ok((QueryResult::Collection(result), operations))
            }

            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => {
                let Some(url) = self.record_url(record) else {
                    debug!(record = %record, "not paired with a remote id; nothing to fetch");
                    return Ok((QueryResult::Single(None), Vec::new()));
                };
                let document = self.get_document(&format!("{url}/{relationship}"), &[]).await?;
                let records = self.serializer.deserialize_document(&document)?;
                let related = match &document.data {
                    Value::Null => None,
                    _ => records.first().cloned(),
                };
                let mut operations: Vec<Operation> =
                    records.iter().cloned().map(Operation::AddRecord).collect();
                operations.push(Operation::UpdateRecord(
                    Record::new(record.record_type.clone(), record.id.clone())
                        .with_has_one(relationship.clone(), related.as_ref().map(Record::identity)),
                ));
                Ok((QueryResult::Single(related), operations))
            }

            QueryExpression::FindRelatedRecords {
                record,
                relationship,
            } => {
                let Some(url) = self.record_url(record) else {
                    debug!(record = %record, "not paired with a remote id; nothing to fetch");
                    return Ok((QueryResult::Collection(Vec::new()), Vec::new()));
                };
                let document = self.get_document(&format!("{url}/{relationship}"), &[]).await?;
                let records = self.serializer.deserialize_document(&document)?;
                let primary = match &document.data {
                    Value::Array(items) => items.len(),
                    _ => 0,
                };
                let related: Vec<Record> = records.iter().take(primary).cloned().collect();
                let mut operations: Vec<Operation> =
                    records.iter().cloned().map(Operation::AddRecord).collect();
                operations.push(Operation::UpdateRecord(
                    Record::new(record.record_type.clone(), record.id.clone()).with_has_many(
                        relationship.clone(),
                        related.iter().map(Record::identity).collect(),
                    ),
                ));
                Ok((QueryResult::Collection(related), operations))
            }
        }
    }

    /// Sends one operation; returns the server's version of the record, if
    /// it answered with one.
    async fn send_operation(&self, operation: &Operation) -> SyncResult<Option<Record>> {
        let (method, url, body) = match operation {
            Operation::AddRecord(record) => (
                Method::POST,
                self.collection_url(&record.record_type),
                Some(self.serializer.serialize_document(record)?),
            ),
            Operation::UpdateRecord(record) => (
                Method::PATCH,
                self.record_url(&record.identity())
                    .ok_or_else(|| unpaired(&record.identity(), self.serializer.resource_key()))?,
                Some(self.serializer.serialize_document(record)?),
            ),
            Operation::RemoveRecord(identity) => (
                Method::DELETE,
                self.record_url(identity)
                    .ok_or_else(|| unpaired(identity, self.serializer.resource_key()))?,
                None,
            ),
        };

        let body = self.request(method, &url, &[], body).await?;
        let Some(body) = body else {
            return Ok(None);
        };
        let document: Document = serde_json::from_value(body)?;
        if document.data.is_null() {
            return Ok(None);
        }
        let resource = serde_json::from_value(document.data)?;
        let record = self
            .serializer
            .deserialize_resource(&resource, Some(operation.identity().id))?;
        Ok(Some(record))
    }
}

fn unpaired(identity: &RecordIdentity, key: &str) -> SyncError {
    SyncError::Conflict(format!("{identity} has no {key}"))
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(format!("request failed: {e}"))
    }
}

/// Maps a non-success status to an error and decodes a JSON body, if any.
async fn checked_body(response: reqwest::Response) -> SyncResult<Option<Value>> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| SyncError::Network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        let detail = if text.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {text}")
        };
        return Err(match status {
            StatusCode::NOT_FOUND => SyncError::NotFound(detail),
            StatusCode::CONFLICT => SyncError::Conflict(detail),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                SyncError::Validation(detail)
            }
            _ => SyncError::Source(detail),
        });
    }

    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

#[async_trait]
impl Source for RemoteSource {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            queryable: true,
            pullable: true,
            pushable: true,
            ..Capabilities::default()
        }
    }

    async fn query(&self, query: &Query) -> SyncResult<QueryResult> {
        let (result, _) = self.fetch(query).await?;
        Ok(result)
    }

    async fn pull(&self, query: &Query) -> SyncResult<Vec<Transform>> {
        let (_, operations) = self.fetch(query).await?;
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Transform::new(operations)])
    }

    /// Returns the pushed transform followed, when the server answered with
    /// records, by a transform carrying the server's versions (assigned
    /// remote ids and server-computed attributes).
    async fn push(&self, transform: &Transform) -> SyncResult<Vec<Transform>> {
        let mut responses = Vec::new();
        for operation in transform.operations() {
            if let Some(record) = self.send_operation(operation).await? {
                responses.push(Operation::UpdateRecord(record));
            }
        }
        info!(
            "Pushed transform {} ({} op(s), {} server update(s))",
            transform.id(),
            transform.len(),
            responses.len()
        );
        let mut transforms = vec![transform.clone()];
        if !responses.is_empty() {
            transforms.push(Transform::new(responses));
        }
        Ok(transforms)
    }
}
