//! Document validation against model schemas

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::{OrbisError, Result};

/// Compiled JSON schema of a model
pub struct SchemaValidator {
    compiled: JSONSchema,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile a model schema
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| OrbisError::Configuration(format!("Invalid model schema: {}", e)))?;

        Ok(Self { compiled })
    }

    /// Validate a document, collecting every violation in the error
    pub fn validate(&self, document: &Value) -> Result<()> {
        let result = self.compiled.validate(document);

        if let Err(errors) = result {
            let messages: Vec<String> = errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect();

            return Err(OrbisError::Validation(messages.join("; ")));
        }

        Ok(())
    }

    /// Whether a document satisfies the schema
    pub fn is_valid(&self, document: &Value) -> bool {
        self.compiled.is_valid(document)
    }
}

/// Validate a document against a schema in one step
pub fn validate_document(schema: &Value, document: &Value) -> Result<()> {
    SchemaValidator::new(schema)?.validate(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "body": { "type": "string", "maxLength": 10 },
                "likes": { "type": "integer" }
            },
            "required": ["body"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_document() {
        validate_document(&post_schema(), &json!({ "body": "hello", "likes": 1 })).unwrap();
    }

    #[test]
    fn test_invalid_documents() {
        let validator = SchemaValidator::new(&post_schema()).unwrap();

        assert!(!validator.is_valid(&json!({ "likes": 1 })));

        let err = validator
            .validate(&json!({ "body": "far too long for this", "extra": true }))
            .unwrap_err();
        match err {
            OrbisError::Validation(msg) => assert!(msg.contains("/body"), "{}", msg),
            other => panic!("Expected Validation variant, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_schema() {
        let err = SchemaValidator::new(&json!({ "type": "not-a-type" })).unwrap_err();
        assert!(matches!(err, OrbisError::Configuration(_)));
    }
}
