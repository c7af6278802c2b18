//! Remote node client
//!
//! An [`OrbisNode`] talks to one indexing node over HTTP and caches the node
//! metadata (models, table name mapping, plugins). The [`OrbisNodeManager`]
//! owns every configured node and tracks which one is active.

use log::{debug, warn};
use orbis_core::{NodeConfig, OrbisConfig, OrbisError};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{ClientError, Result};

/// Header carrying the node API key
pub const API_KEY_HEADER: &str = "x-orbis-api-key";

/// Model indexed by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeModel {
    /// Table name
    pub name: String,

    /// Model stream id
    pub stream_id: String,
}

/// Plugin installed on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePlugin {
    /// Plugin id
    pub id: String,

    /// Plugin name
    pub name: String,

    /// Hooks the plugin is registered on
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// Node metadata as served by `/api/metadata`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Node version
    #[serde(default)]
    pub version: String,

    /// Indexed models
    #[serde(default)]
    pub models: Vec<NodeModel>,

    /// Model id to table name
    #[serde(default)]
    pub models_mapping: HashMap<String, String>,

    /// Installed plugins
    #[serde(default)]
    pub plugins: Vec<NodePlugin>,
}

/// Rows returned by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, taken from the first row
    pub columns: Vec<String>,

    /// Result rows
    pub rows: Vec<Map<String, Value>>,
}

/// Outcome of a force-index request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ForceIndexingResult {
    /// Document indexed
    Ok {
        /// Indexing result
        result: Value,
        /// Full response of the node
        server_response: Value,
    },
    /// Indexing failed
    Error {
        /// Failure reason
        error: String,
        /// Full response of the node, if any was received
        server_response: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Status code of a response envelope, numeric or numeric string
fn envelope_status(status: &Value) -> Option<u16> {
    match status {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Client for a single node
#[derive(Debug)]
pub struct OrbisNode {
    gateway: String,
    key: Option<String>,
    env: Option<String>,
    is_primary: bool,
    client: Client,
    timeout: Duration,
    metadata: RwLock<Option<NodeMetadata>>,
}

impl OrbisNode {
    /// Create a node client
    pub fn new(config: &NodeConfig, is_primary: bool, timeout: Duration) -> Self {
        Self {
            gateway: config.normalized_gateway().to_string(),
            key: config.key.clone(),
            env: config.env.clone(),
            is_primary,
            client: Client::new(),
            timeout,
            metadata: RwLock::new(None),
        }
    }

    /// Base url of the node
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Whether this is the first configured node
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Environment forwarded with queries
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    fn url(&self, route: &str) -> String {
        if route.starts_with('/') {
            format!("{}{}", self.gateway, route)
        } else {
            format!("{}/{}", self.gateway, route)
        }
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.timeout(self.timeout);
        match &self.key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn get(&self, route: &str) -> Result<reqwest::Response> {
        let response = self
            .prepare(self.client.get(self.url(route)))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(ClientError::Node { status, message });
        }

        Ok(response)
    }

    /// Whether the node answers `pong`
    pub async fn ping(&self) -> Result<bool> {
        let response = self.prepare(self.client.get(self.url("/api/ping"))).send().await?;
        let text = response.text().await?;
        Ok(text.trim() == "pong")
    }

    /// Fetch the node metadata and refresh the cache
    pub async fn fetch_metadata(&self) -> Result<NodeMetadata> {
        debug!("Fetching metadata of {}", self.gateway);
        let metadata: NodeMetadata = self.get("/api/metadata").await?.json().await?;

        *self.metadata.write().await = Some(metadata.clone());
        Ok(metadata)
    }

    /// Cached metadata, fetched on first use
    pub async fn metadata(&self) -> Result<NodeMetadata> {
        if let Some(metadata) = self.metadata.read().await.as_ref() {
            return Ok(metadata.clone());
        }

        self.fetch_metadata().await
    }

    /// Indexed models
    pub async fn models(&self) -> Result<Vec<NodeModel>> {
        Ok(self.metadata().await?.models)
    }

    /// Installed plugins
    pub async fn plugins(&self) -> Result<Vec<NodePlugin>> {
        Ok(self.metadata().await?.plugins)
    }

    /// Run a JSON query
    ///
    /// The node compiles the query itself, the JSON structure is sent as is.
    pub async fn query(&self, json_query: &Value) -> Result<QueryResult> {
        let mut body = json!({ "jsonQuery": json_query });
        if let Some(env) = &self.env {
            body["env"] = Value::String(env.clone());
        }

        let response = self
            .prepare(self.client.post(self.url("/api/db/query/json")))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(ClientError::Node { status, message });
        }

        let envelope: QueryEnvelope = response.json().await?;
        let status = envelope_status(&envelope.status);
        if status != Some(200) {
            return Err(ClientError::Node {
                status: status.unwrap_or_default(),
                message: envelope
                    .error
                    .as_ref()
                    .map(describe)
                    .unwrap_or_else(|| "Error querying database".to_string()),
            });
        }

        let columns = envelope
            .data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        Ok(QueryResult {
            columns,
            rows: envelope.data,
        })
    }

    /// Ask the node to index a document right away
    ///
    /// Failures are reported in the result, never as an error.
    pub async fn force_index(&self, id: &str) -> ForceIndexingResult {
        let route = format!("/force-index/{}", id);
        let response = match self.prepare(self.client.get(self.url(&route))).send().await {
            Ok(response) => response,
            Err(e) => {
                return ForceIndexingResult::Error {
                    error: e.to_string(),
                    server_response: None,
                }
            }
        };

        let server_response: Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                return ForceIndexingResult::Error {
                    error: e.to_string(),
                    server_response: None,
                }
            }
        };

        let status = envelope_status(&server_response["status"]);
        let result = server_response.get("result").cloned().unwrap_or(Value::Null);

        if status == Some(200) {
            return ForceIndexingResult::Ok {
                result,
                server_response,
            };
        }

        let error = server_response
            .get("error")
            .filter(|e| !e.is_null())
            .or_else(|| Some(&result).filter(|r| !r.is_null()))
            .or_else(|| server_response.get("status"))
            .map(describe)
            .unwrap_or_else(|| "Unknown indexing error".to_string());

        ForceIndexingResult::Error {
            error,
            server_response: Some(server_response),
        }
    }

    /// Table name of a model id, from the cached metadata only
    pub async fn get_table_name(&self, model_id: &str) -> Option<String> {
        self.metadata
            .read()
            .await
            .as_ref()
            .and_then(|metadata| metadata.models_mapping.get(model_id).cloned())
    }

    async fn cached_model_id(&self, table: &str) -> Result<Option<String>> {
        let metadata = self.metadata.read().await;
        let Some(metadata) = metadata.as_ref() else {
            return Ok(None);
        };

        let mut ids: Vec<&String> = metadata
            .models_mapping
            .iter()
            .filter(|(_, name)| name.as_str() == table)
            .map(|(id, _)| id)
            .collect();

        match ids.len() {
            0 => Ok(None),
            1 => Ok(Some(ids[0].clone())),
            _ => {
                ids.sort();
                Err(OrbisError::Configuration(format!(
                    "Table {} is ambiguous, it maps to models {:?}",
                    table, ids
                ))
                .into())
            }
        }
    }

    /// Model id of a table name
    ///
    /// A cache miss triggers a single metadata refetch. A table name shared
    /// by several models is a configuration error.
    pub async fn get_table_model_id(&self, table: &str) -> Result<Option<String>> {
        if let Some(id) = self.cached_model_id(table).await? {
            return Ok(Some(id));
        }

        debug!("Table {} not cached, refreshing metadata", table);
        self.fetch_metadata().await?;
        self.cached_model_id(table).await
    }
}

/// Set of configured nodes with one active node
#[derive(Debug)]
pub struct OrbisNodeManager {
    nodes: Vec<Arc<OrbisNode>>,
    active: AtomicUsize,
}

impl OrbisNodeManager {
    /// Create node clients for every configured node
    pub fn new(config: &OrbisConfig) -> Result<Self> {
        if config.nodes.is_empty() {
            return Err(OrbisError::Configuration(
                "At least one node configuration is required".to_string(),
            )
            .into());
        }

        let nodes = config
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| Arc::new(OrbisNode::new(node, index == 0, config.request_timeout())))
            .collect();

        Ok(Self {
            nodes,
            active: AtomicUsize::new(0),
        })
    }

    /// All nodes, primary first
    pub fn nodes(&self) -> &[Arc<OrbisNode>] {
        &self.nodes
    }

    /// Node queries are sent to
    pub fn active(&self) -> Arc<OrbisNode> {
        let index = self.active.load(Ordering::Acquire);
        Arc::clone(&self.nodes[index.min(self.nodes.len() - 1)])
    }

    /// Switch the active node
    pub fn set_active(&self, index: usize) -> Result<Arc<OrbisNode>> {
        let node = self.nodes.get(index).ok_or_else(|| {
            OrbisError::Configuration(format!(
                "No node at index {} ({} configured)",
                index,
                self.nodes.len()
            ))
        })?;

        if index != self.active.swap(index, Ordering::AcqRel) {
            warn!("Active node switched to {}", node.gateway());
        }

        Ok(Arc::clone(node))
    }
}
