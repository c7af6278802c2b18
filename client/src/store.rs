//! Document and session stores
//!
//! [`DocumentStore`] is the contract of the decentralized document network
//! the SDK writes to. [`SessionStore`] persists serialized sessions between
//! runs of an application.

use async_trait::async_trait;
use log::warn;
use orbis_core::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// Stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stream id
    pub id: String,

    /// Model stream id
    pub model: String,

    /// Document content
    pub content: Value,

    /// DID controlling the document
    pub controller: String,

    /// Context stream id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Store specific metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Document to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    /// Model stream id
    pub model: String,

    /// Document content
    pub content: Value,

    /// Context stream id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// How documents of a model relate to their controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountRelation {
    /// Any number of documents
    #[default]
    List,
    /// One document per controller
    Single,
    /// One document per controller and unique field values
    Set {
        /// Fields whose values identify the document
        fields: Vec<String>,
    },
}

/// Model stream content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Model stream id
    pub id: String,

    /// Model name
    #[serde(default)]
    pub name: Option<String>,

    /// JSON schema of the documents
    pub schema: Value,

    /// Account relation of the model
    #[serde(default)]
    pub account_relation: AccountRelation,
}

/// Read-modify-write step applied to the current document
pub type DocumentSetter = Box<dyn FnOnce(&Document) -> Result<Value> + Send>;

/// Whether a string looks like a base36 stream id
pub fn is_stream_id(value: &str) -> bool {
    match value.strip_prefix('k') {
        Some(rest) => {
            rest.len() >= 40
                && rest
                    .chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        }
        None => false,
    }
}

/// Document network contract
///
/// Writes require a session, see [`DocumentStore::set_session`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document of a list model
    async fn create_document(&self, document: NewDocument) -> Result<Document>;

    /// Create or replace the document of a single model
    async fn create_document_single(&self, document: NewDocument) -> Result<Document>;

    /// Create or replace the document of a set model identified by `unique`
    async fn create_document_set(
        &self,
        document: NewDocument,
        unique: Vec<String>,
    ) -> Result<Document>;

    /// Replace the content of a document
    async fn update_document(&self, id: &str, content: Value) -> Result<Document>;

    /// Replace the content of a document with the setter output
    async fn update_document_by_setter(&self, id: &str, setter: DocumentSetter)
        -> Result<Document>;

    /// Load a document
    async fn get_document(&self, id: &str) -> Result<Document>;

    /// Load a model definition
    async fn load_model(&self, model_id: &str) -> Result<ModelDefinition>;

    /// Whether a string is a stream id
    fn is_stream_id_string(&self, value: &str) -> bool {
        is_stream_id(value)
    }

    /// Install or remove the session used for writes
    async fn set_session(&self, session: Option<Session>) -> Result<()>;
}

/// Key value persistence of serialized sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read an item
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write an item
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete an item
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// Process local [`SessionStore`]
///
/// Nothing survives the process, pass a persistent store to keep sessions.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        warn!("Sessions are kept in memory and will not be preserved");
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory [`DocumentStore`] used by the statement tests

    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryDocumentStore {
        pub documents: Mutex<Vec<Document>>,
        pub models: HashMap<String, ModelDefinition>,
        pub session: Mutex<Option<Session>>,
        pub model_loads: AtomicUsize,
        /// Contents containing this string are rejected on create
        pub reject_marker: Option<String>,
        counter: AtomicUsize,
    }

    impl MemoryDocumentStore {
        pub fn with_model(mut self, model: ModelDefinition) -> Self {
            self.models.insert(model.id.clone(), model);
            self
        }

        pub fn stored(&self) -> Vec<Document> {
            self.documents.lock().unwrap().clone()
        }

        fn controller(&self) -> Result<String> {
            self.session
                .lock()
                .unwrap()
                .as_ref()
                .map(|session| session.did().to_string())
                .ok_or_else(|| ClientError::NoSession("Unable to create document".to_string()))
        }

        fn insert(&self, document: NewDocument, existing: Option<usize>) -> Result<Document> {
            let controller = self.controller()?;
            if let Some(marker) = &self.reject_marker {
                if document.content.to_string().contains(marker.as_str()) {
                    return Err(ClientError::Store("Rejected by the network".to_string()));
                }
            }

            let mut documents = self.documents.lock().unwrap();
            if let Some(index) = existing {
                documents[index].content = document.content;
                return Ok(documents[index].clone());
            }

            let id = format!(
                "kjzl6kcym7w8y{:040}",
                self.counter.fetch_add(1, Ordering::SeqCst)
            );
            let created = Document {
                id,
                model: document.model,
                content: document.content,
                controller,
                context: document.context,
                metadata: Map::new(),
            };
            documents.push(created.clone());
            Ok(created)
        }

        fn position<F: Fn(&Document) -> bool>(&self, predicate: F) -> Option<usize> {
            self.documents.lock().unwrap().iter().position(predicate)
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryDocumentStore {
        async fn create_document(&self, document: NewDocument) -> Result<Document> {
            self.insert(document, None)
        }

        async fn create_document_single(&self, document: NewDocument) -> Result<Document> {
            let controller = self.controller()?;
            let existing =
                self.position(|d| d.model == document.model && d.controller == controller);
            self.insert(document, existing)
        }

        async fn create_document_set(
            &self,
            document: NewDocument,
            unique: Vec<String>,
        ) -> Result<Document> {
            let controller = self.controller()?;
            let model = self.models.get(&document.model).cloned();
            let fields = match model.map(|m| m.account_relation) {
                Some(AccountRelation::Set { fields }) => fields,
                _ => Vec::new(),
            };
            let existing = self.position(|d| {
                d.model == document.model
                    && d.controller == controller
                    && fields
                        .iter()
                        .zip(&unique)
                        .all(|(field, value)| d.content[field].as_str() == Some(value.as_str()))
            });
            self.insert(document, existing)
        }

        async fn update_document(&self, id: &str, content: Value) -> Result<Document> {
            let mut documents = self.documents.lock().unwrap();
            let document = documents
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| ClientError::Store(format!("Unknown document {}", id)))?;
            document.content = content;
            Ok(document.clone())
        }

        async fn update_document_by_setter(
            &self,
            id: &str,
            setter: DocumentSetter,
        ) -> Result<Document> {
            let current = self.get_document(id).await?;
            let content = setter(&current)?;
            self.update_document(id, content).await
        }

        async fn get_document(&self, id: &str) -> Result<Document> {
            self.documents
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| ClientError::Store(format!("Unknown document {}", id)))
        }

        async fn load_model(&self, model_id: &str) -> Result<ModelDefinition> {
            self.model_loads.fetch_add(1, Ordering::SeqCst);
            self.models
                .get(model_id)
                .cloned()
                .ok_or_else(|| ClientError::Store(format!("Unknown model {}", model_id)))
        }

        async fn set_session(&self, session: Option<Session>) -> Result<()> {
            *self.session.lock().unwrap() = session;
            Ok(())
        }
    }
}
