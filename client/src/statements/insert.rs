//! Insert statements

use futures::future::join_all;
use log::{debug, warn};
use orbis_core::schema::SchemaValidator;
use orbis_core::OrbisError;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{run_recorded, StatementContext, StatementHistory};
use crate::error::Result;
use crate::store::{Document, ModelDefinition, NewDocument};

/// Insert of a single document
pub struct InsertStatement {
    client: Arc<StatementContext>,
    model: String,
    value: Option<Value>,
    context: Option<String>,
    history: StatementHistory,
}

impl std::fmt::Debug for InsertStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertStatement")
            .field("model", &self.model)
            .field("value", &self.value)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl InsertStatement {
    pub(crate) fn new(client: Arc<StatementContext>, model: String) -> Self {
        Self {
            client,
            model,
            value: None,
            context: None,
            history: StatementHistory::new(),
        }
    }

    /// Model id or table name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Document to insert
    pub fn document(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Set the document
    pub fn value(mut self, value: Value) -> Self {
        if self.value.is_some() {
            warn!("value called more than once, the previous document is replaced");
        }
        self.value = Some(value);
        self
    }

    /// Context of the document
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn require_value(&self) -> Result<&Value> {
        self.value.as_ref().ok_or_else(|| {
            OrbisError::Configuration("Insert statement contains no values".to_string()).into()
        })
    }

    async fn definition(&self) -> Result<ModelDefinition> {
        let model_id = self.client.resolve_model(&self.model).await?;
        self.client.model_definition(&model_id).await
    }

    /// Check the document against the model schema
    pub async fn validate(&self) -> Result<()> {
        let value = self.require_value()?;
        let definition = self.definition().await?;
        SchemaValidator::new(&definition.schema)?.validate(value)?;
        Ok(())
    }

    /// Create the document
    ///
    /// Missing values, unknown models and schema violations fail before
    /// anything is written.
    pub async fn run(&self) -> Result<Document> {
        let value = self.require_value()?.clone();
        let definition = self.definition().await?;
        SchemaValidator::new(&definition.schema)?.validate(&value)?;

        let document = NewDocument {
            model: definition.id.clone(),
            content: value,
            context: self.context.clone(),
        };
        let query = json!({ "model": document.model, "document": document.content });

        run_recorded(&self.history, query, self.client.create(&definition, document)).await
    }

    /// Runs of this statement
    pub fn history(&self) -> &StatementHistory {
        &self.history
    }
}

/// Document created by a bulk insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertedDocument {
    /// Position in the submitted values
    pub index: usize,
    /// Submitted content
    pub document: Value,
    /// Stream id of the created document
    pub id: String,
}

/// Document a bulk insert could not create
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDocument {
    /// Position in the submitted values
    pub index: usize,
    /// Submitted content
    pub document: Value,
    /// Failure reason
    pub error: String,
}

/// Settled bulk insert
///
/// Documents are created concurrently, in no defined order, but both lists
/// follow the order the values were submitted in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkInsertResult {
    /// Created documents
    pub success: Vec<InsertedDocument>,
    /// Failed documents
    pub errors: Vec<FailedDocument>,
}

/// Concurrent insert of many documents
pub struct BulkInsertStatement {
    client: Arc<StatementContext>,
    model: String,
    values: Vec<Value>,
    context: Option<String>,
    history: StatementHistory,
}

impl std::fmt::Debug for BulkInsertStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkInsertStatement")
            .field("model", &self.model)
            .field("values", &self.values.len())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl BulkInsertStatement {
    pub(crate) fn new(client: Arc<StatementContext>, model: String) -> Self {
        Self {
            client,
            model,
            values: Vec::new(),
            context: None,
            history: StatementHistory::new(),
        }
    }

    /// Model id or table name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Documents to insert
    pub fn documents(&self) -> &[Value] {
        &self.values
    }

    /// Append a document
    pub fn value(mut self, value: Value) -> Self {
        self.values.push(value);
        self
    }

    /// Append documents
    pub fn values<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        self.values.extend(values);
        self
    }

    /// Context of every document
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn require_values(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(OrbisError::Configuration(
                "Bulk insert statement contains no values".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn definition(&self) -> Result<ModelDefinition> {
        let model_id = self.client.resolve_model(&self.model).await?;
        self.client.model_definition(&model_id).await
    }

    /// Documents violating the model schema
    pub async fn validate(&self) -> Result<Vec<FailedDocument>> {
        self.require_values()?;
        let definition = self.definition().await?;
        let validator = SchemaValidator::new(&definition.schema)?;

        Ok(self
            .values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| {
                validator.validate(value).err().map(|e| FailedDocument {
                    index,
                    document: value.clone(),
                    error: e.to_string(),
                })
            })
            .collect())
    }

    /// Create every document concurrently
    ///
    /// Individual failures, schema violations included, are reported in the
    /// result. Only an empty statement or an unresolvable model fails the run.
    pub async fn run(&self) -> Result<BulkInsertResult> {
        self.require_values()?;
        let definition = Arc::new(self.definition().await?);
        let validator = Arc::new(SchemaValidator::new(&definition.schema)?);

        debug!(
            "Inserting {} documents in {}",
            self.values.len(),
            definition.id
        );

        let tasks: Vec<_> = self
            .values
            .iter()
            .cloned()
            .map(|value| {
                let client = Arc::clone(&self.client);
                let definition = Arc::clone(&definition);
                let validator = Arc::clone(&validator);
                let context = self.context.clone();

                tokio::spawn(async move {
                    validator.validate(&value)?;
                    let document = NewDocument {
                        model: definition.id.clone(),
                        content: value,
                        context,
                    };
                    client.create(&definition, document).await
                })
            })
            .collect();

        let settled = join_all(tasks).await;

        let mut result = BulkInsertResult::default();
        let outcomes = self.values.iter().cloned().zip(settled);
        for (index, (document, outcome)) in outcomes.enumerate() {
            match outcome {
                Ok(Ok(created)) => result.success.push(InsertedDocument {
                    index,
                    document,
                    id: created.id,
                }),
                Ok(Err(e)) => result.errors.push(FailedDocument {
                    index,
                    document,
                    error: e.to_string(),
                }),
                Err(e) => result.errors.push(FailedDocument {
                    index,
                    document,
                    error: format!("Insert task failed: {}", e),
                }),
            }
        }

        if !result.errors.is_empty() {
            warn!(
                "{} of {} documents could not be inserted",
                result.errors.len(),
                self.values.len()
            );
        }

        let query = json!({ "model": definition.id, "documents": self.values.len() });
        self.history.record_success(
            query,
            json!({ "success": result.success.len(), "errors": result.errors.len() }),
        );

        Ok(result)
    }

    /// Runs of this statement
    pub fn history(&self) -> &StatementHistory {
        &self.history
    }
}
