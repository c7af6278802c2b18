//! Statement builders
//!
//! Statements accumulate query intent fluently and execute on `run()`:
//! selects are sent as JSON queries to the active node, inserts and updates
//! go to the document store. Every statement keeps the history of its runs.
//!
//! ```no_run
//! # async fn example(builder: orbis_client::QueryBuilder) -> orbis_client::Result<()> {
//! use orbis_core::query::operators::gte;
//! use serde_json::json;
//!
//! let posts = builder
//!     .select()
//!     .from("posts")
//!     .filter(json!({ "likes": gte(10) }))
//!     .limit(20)
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod history;
mod insert;
mod select;
mod update;

pub use history::{RunOutcome, StatementHistory, StatementRun};
pub use insert::{BulkInsertResult, BulkInsertStatement, FailedDocument, InsertStatement, InsertedDocument};
pub use select::{RawSelectStatement, SelectStatement};
pub use update::{UpdateByIdStatement, UpdateMode};

use log::{debug, error, warn};
use orbis_core::OrbisError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{ClientError, Result};
use crate::node::{OrbisNodeManager, QueryResult};
use crate::store::{AccountRelation, Document, DocumentStore, ModelDefinition, NewDocument};

/// Collaborators shared by every statement of a client
pub(crate) struct StatementContext {
    nodes: Arc<OrbisNodeManager>,
    store: Arc<dyn DocumentStore>,
    models: RwLock<HashMap<String, ModelDefinition>>,
}

impl StatementContext {
    pub(crate) fn new(nodes: Arc<OrbisNodeManager>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            nodes,
            store,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Model id of a model id or table name
    pub(crate) async fn resolve_model(&self, model: &str) -> Result<String> {
        if self.store.is_stream_id_string(model) {
            return Ok(model.to_string());
        }

        match self.nodes.active().get_table_model_id(model).await? {
            Some(id) => {
                debug!("Resolved table {} to model {}", model, id);
                Ok(id)
            }
            None => Err(OrbisError::Configuration(format!(
                "Unknown model or table {}",
                model
            ))
            .into()),
        }
    }

    /// Definition of a model id, loaded once
    pub(crate) async fn model_definition(&self, model_id: &str) -> Result<ModelDefinition> {
        if let Some(definition) = self.models.read().await.get(model_id) {
            return Ok(definition.clone());
        }

        let definition = self.store.load_model(model_id).await?;
        self.models
            .write()
            .await
            .insert(model_id.to_string(), definition.clone());
        Ok(definition)
    }

    /// Create a document the way the model account relation requires
    pub(crate) async fn create(
        &self,
        model: &ModelDefinition,
        document: NewDocument,
    ) -> Result<Document> {
        match &model.account_relation {
            AccountRelation::List => self.store.create_document(document).await,
            AccountRelation::Single => self.store.create_document_single(document).await,
            AccountRelation::Set { fields } => {
                let unique = unique_values(fields, &document.content)?;
                self.store.create_document_set(document, unique).await
            }
        }
    }

    /// Send a JSON query to the active node
    pub(crate) async fn query(&self, query: &Value) -> Result<QueryResult> {
        self.nodes.active().query(query).await
    }
}

/// Values of the unique fields of a set model, in field order
fn unique_values(fields: &[String], content: &Value) -> Result<Vec<String>> {
    fields
        .iter()
        .map(|field| match content.get(field) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(Value::Null) | None => Err(OrbisError::Validation(format!(
                "Missing unique field {}",
                field
            ))
            .into()),
            Some(other) => Ok(other.to_string()),
        })
        .collect()
}

/// History entry of a result, `null` when it has no JSON form
fn recorded_value<T: Serialize>(result: &T) -> Value {
    serde_json::to_value(result).unwrap_or_else(|e| {
        warn!("Recording statement result as null: {}", e);
        Value::Null
    })
}

/// Run a statement, recording the attempt and wrapping failures with the query
pub(crate) async fn run_recorded<T, F>(history: &StatementHistory, query: Value, run: F) -> Result<T>
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    match run.await {
        Ok(result) => {
            history.record_success(query, recorded_value(&result));
            Ok(result)
        }
        Err(err) => {
            error!("Statement failed: {}", err);
            history.record_failure(query.clone(), &err);
            Err(ClientError::Query {
                query,
                source: Box::new(err),
            })
        }
    }
}

/// Entry point of every statement
#[derive(Clone)]
pub struct QueryBuilder {
    context: Arc<StatementContext>,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder").finish_non_exhaustive()
    }
}

impl QueryBuilder {
    /// Create a builder over a node manager and a document store
    pub fn new(nodes: Arc<OrbisNodeManager>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            context: Arc::new(StatementContext::new(nodes, store)),
        }
    }

    /// Select rows from a table
    pub fn select(&self) -> SelectStatement {
        SelectStatement::new().attach(Arc::clone(&self.context))
    }

    /// Run raw SQL
    pub fn raw_select(&self, query: impl Into<String>, params: Vec<Value>) -> RawSelectStatement {
        RawSelectStatement::new(query, params).attach(Arc::clone(&self.context))
    }

    /// Insert one document in a model or table
    pub fn insert(&self, model: impl Into<String>) -> InsertStatement {
        InsertStatement::new(Arc::clone(&self.context), model.into())
    }

    /// Insert documents concurrently in a model or table
    pub fn insert_bulk(&self, model: impl Into<String>) -> BulkInsertStatement {
        BulkInsertStatement::new(Arc::clone(&self.context), model.into())
    }

    /// Update a document by stream id
    pub fn update(&self, id: impl Into<String>) -> UpdateByIdStatement {
        UpdateByIdStatement::new(Arc::clone(&self.context), id.into())
    }

    /// Definition of a model id or table name
    pub async fn model_definition(&self, model: &str) -> Result<ModelDefinition> {
        let model_id = self.context.resolve_model(model).await?;
        self.context.model_definition(&model_id).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use orbis_core::{NodeConfig, OrbisConfig};
    use serde_json::json;

    pub(crate) const POSTS_MODEL: &str =
        "kjzl6hvfrbw6c5ajfmes842lu09vjxu5956e3xq0xk12gp2jcf9s90cagt2god9";
    pub(crate) const PROFILE_MODEL: &str =
        "kjzl6hvfrbw6c7keo17n66rxyo21nqqaa9lh491jz16od43nokz7ksfcvzi6bwc";
    pub(crate) const LIKES_MODEL: &str =
        "kjzl6hvfrbw6c8dzq9a0fh3x6ks2mwbrwwng8n7ik1vclq6ytnxkgwxdwx3tf3q";

    pub(crate) fn models() -> Vec<ModelDefinition> {
        vec![
            ModelDefinition {
                id: POSTS_MODEL.to_string(),
                name: Some("posts".to_string()),
                schema: json!({
                    "type": "object",
                    "properties": { "body": { "type": "string" } },
                    "required": ["body"]
                }),
                account_relation: AccountRelation::List,
            },
            ModelDefinition {
                id: PROFILE_MODEL.to_string(),
                name: Some("profiles".to_string()),
                schema: json!({ "type": "object" }),
                account_relation: AccountRelation::Single,
            },
            ModelDefinition {
                id: LIKES_MODEL.to_string(),
                name: Some("likes".to_string()),
                schema: json!({ "type": "object" }),
                account_relation: AccountRelation::Set {
                    fields: vec!["postId".to_string()],
                },
            },
        ]
    }

    /// Document store with the test models and an active session
    pub(crate) async fn document_store() -> Arc<MemoryDocumentStore> {
        let store = models()
            .into_iter()
            .fold(MemoryDocumentStore::default(), MemoryDocumentStore::with_model);
        let session = crate::auth::KeyDidAuthenticator::from_seed([9u8; 32]).authenticate();
        store.set_session(Some(session)).await.unwrap();
        Arc::new(store)
    }

    pub(crate) fn builder(gateway: &str, store: Arc<MemoryDocumentStore>) -> QueryBuilder {
        let config = OrbisConfig::with_nodes(vec![NodeConfig::new(gateway)]);
        let nodes = Arc::new(OrbisNodeManager::new(&config).unwrap());
        QueryBuilder::new(nodes, store)
    }

    pub(crate) fn metadata_body() -> String {
        json!({
            "version": "0.4.0",
            "models": [],
            "models_mapping": {
                POSTS_MODEL: "posts",
                PROFILE_MODEL: "profiles",
                LIKES_MODEL: "likes"
            },
            "plugins": []
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_model_resolution_and_cache() {
        let mut server = mockito::Server::new_async().await;
        let metadata = server
            .mock("GET", "/api/metadata")
            .with_body(metadata_body())
            .expect(2)
            .create_async()
            .await;

        let store = document_store().await;
        let builder = builder(&server.url(), Arc::clone(&store));

        // One fetch to resolve "posts", one refetch for the unknown table
        let by_table = builder.model_definition("posts").await.unwrap();
        let by_id = builder.model_definition(POSTS_MODEL).await.unwrap();
        assert_eq!(by_table, by_id);
        assert_eq!(store.model_loads.load(Ordering::SeqCst), 1);

        let err = builder.model_definition("comments").await.unwrap_err();
        assert!(matches!(err, ClientError::Core(OrbisError::Configuration(_))));
        metadata.assert_async().await;
    }

    #[tokio::test]
    async fn test_unserializable_result_is_recorded_as_null() {
        let history = StatementHistory::new();
        let mut result = HashMap::new();
        result.insert((1u8, 2u8), "pair");

        let returned = run_recorded(&history, json!({ "$table": "posts" }), async {
            Ok(result.clone())
        })
        .await
        .unwrap();
        assert_eq!(returned, result);

        let runs = history.runs();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].success);
        assert_eq!(runs[0].outcome, RunOutcome::Result(Value::Null));
    }

    #[test]
    fn test_unique_values() {
        let fields = vec!["postId".to_string(), "rank".to_string()];
        assert_eq!(
            unique_values(&fields, &json!({ "postId": "k1", "rank": 2 })).unwrap(),
            vec!["k1", "2"]
        );
        assert!(unique_values(&fields, &json!({ "postId": "k1" })).is_err());
    }
}
