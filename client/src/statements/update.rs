//! Update statements

use log::warn;
use orbis_core::OrbisError;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{run_recorded, StatementContext, StatementHistory};
use crate::error::Result;
use crate::store::{Document, DocumentSetter};

/// How the new content is derived
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateMode {
    /// Overwrite the whole content
    Replace(Value),
    /// Shallow merge onto the current content
    Set(Value),
}

impl UpdateMode {
    fn name(&self) -> &'static str {
        match self {
            UpdateMode::Replace(_) => "replace",
            UpdateMode::Set(_) => "set",
        }
    }
}

/// Shallow merge of a patch onto document content
fn merge(current: &Value, patch: Value) -> Result<Value> {
    let (Some(current), Value::Object(patch)) = (current.as_object(), patch) else {
        return Err(OrbisError::Validation(
            "Set updates need object content and an object patch".to_string(),
        )
        .into());
    };

    let mut merged = current.clone();
    merged.extend(patch);
    Ok(Value::Object(merged))
}

/// Update of one document by stream id
pub struct UpdateByIdStatement {
    client: Arc<StatementContext>,
    id: String,
    mode: Option<UpdateMode>,
    history: StatementHistory,
}

impl std::fmt::Debug for UpdateByIdStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateByIdStatement")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl UpdateByIdStatement {
    pub(crate) fn new(client: Arc<StatementContext>, id: String) -> Self {
        Self {
            client,
            id,
            mode: None,
            history: StatementHistory::new(),
        }
    }

    /// Stream id of the document
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Selected mode
    pub fn mode(&self) -> Option<&UpdateMode> {
        self.mode.as_ref()
    }

    fn select(mut self, mode: UpdateMode) -> Self {
        if let Some(previous) = &self.mode {
            warn!(
                "{} replaces the pending {} update of {}",
                mode.name(),
                previous.name(),
                self.id
            );
        }
        self.mode = Some(mode);
        self
    }

    /// Overwrite the content
    pub fn replace(self, content: Value) -> Self {
        self.select(UpdateMode::Replace(content))
    }

    /// Merge top level fields onto the current content
    pub fn set(self, patch: Value) -> Self {
        self.select(UpdateMode::Set(patch))
    }

    /// Apply the update
    pub async fn run(&self) -> Result<Document> {
        let mode = self.mode.clone().ok_or_else(|| {
            OrbisError::Configuration("Update statement contains no values".to_string())
        })?;

        let store = self.client.store();
        match mode {
            UpdateMode::Replace(content) => {
                let query = json!({ "id": self.id, "replace": content });
                run_recorded(&self.history, query, store.update_document(&self.id, content))
                    .await
            }
            UpdateMode::Set(patch) => {
                if !patch.is_object() {
                    return Err(OrbisError::Validation(format!(
                        "Set patch must be an object, got {}",
                        patch
                    ))
                    .into());
                }

                let query = json!({ "id": self.id, "set": patch });
                let setter: DocumentSetter =
                    Box::new(move |current: &Document| merge(&current.content, patch));
                run_recorded(
                    &self.history,
                    query,
                    store.update_document_by_setter(&self.id, setter),
                )
                .await
            }
        }
    }

    /// Runs of this statement
    pub fn history(&self) -> &StatementHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::error::ClientError;

    async fn seeded() -> (crate::statements::QueryBuilder, String) {
        let builder = builder("http://127.0.0.1:9", document_store().await);
        let created = builder
            .insert(POSTS_MODEL)
            .value(json!({ "body": "gm", "likes": 1 }))
            .run()
            .await
            .unwrap();
        (builder, created.id)
    }

    #[tokio::test]
    async fn test_replace() {
        let (builder, id) = seeded().await;
        let updated = builder
            .update(&id)
            .replace(json!({ "body": "gn" }))
            .run()
            .await
            .unwrap();
        assert_eq!(updated.content, json!({ "body": "gn" }));
    }

    #[tokio::test]
    async fn test_set_merges_shallowly() {
        let (builder, id) = seeded().await;
        let statement = builder.update(&id).set(json!({ "likes": 2, "tags": ["a"] }));
        let updated = statement.run().await.unwrap();

        assert_eq!(updated.content, json!({ "body": "gm", "likes": 2, "tags": ["a"] }));
        assert_eq!(statement.history().len(), 1);
    }

    #[tokio::test]
    async fn test_last_mode_wins() {
        let (builder, id) = seeded().await;
        let statement = builder
            .update(&id)
            .replace(json!({ "body": "gone" }))
            .set(json!({ "likes": 5 }));
        assert!(matches!(statement.mode(), Some(UpdateMode::Set(_))));

        let updated = statement.run().await.unwrap();
        assert_eq!(updated.content, json!({ "body": "gm", "likes": 5 }));
    }

    #[tokio::test]
    async fn test_invalid_updates() {
        let (builder, id) = seeded().await;

        let err = builder.update(&id).run().await.unwrap_err();
        assert!(matches!(err, ClientError::Core(OrbisError::Configuration(_))));

        let err = builder.update(&id).set(json!([1])).run().await.unwrap_err();
        assert!(matches!(err, ClientError::Core(OrbisError::Validation(_))));

        let err = builder
            .update("kjzl6unknown")
            .replace(json!({}))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query { .. }));
    }

    #[test]
    fn test_merge_requires_objects() {
        assert!(merge(&json!("text"), json!({ "a": 1 })).is_err());
        assert_eq!(
            merge(&json!({ "a": { "x": 1 }, "b": 1 }), json!({ "a": { "y": 2 } })).unwrap(),
            json!({ "a": { "y": 2 }, "b": 1 })
        );
    }
}
