//! Entity and schema types - the input contract for a run.

use serde::{Deserialize, Serialize};

use crate::error::ImputeError;

/// The entity a run gathers data for.
///
/// `name` is the only required part. The optional context strings are
/// folded into the search query to disambiguate entities that share a
/// name (e.g. a part number that collides with a product line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityToImpute {
    /// Canonical entity name (never blank)
    pub name: String,

    /// Extra identifying context, e.g. "microcontroller ARM Cortex-M4"
    pub identifier_context: Option<String>,

    /// Why the data is being gathered, folded into the query
    pub task_purpose: Option<String>,
}

impl EntityToImpute {
    /// Create a new entity. Fails if the name is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ImputeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ImputeError::InvalidEntity {
                reason: "entity name cannot be empty".to_string(),
            });
        }
        Ok(Self {
            name,
            identifier_context: None,
            task_purpose: None,
        })
    }

    /// Add identifying context.
    pub fn with_identifier_context(mut self, context: impl Into<String>) -> Self {
        self.identifier_context = Some(context.into());
        self
    }

    /// Add a task purpose.
    pub fn with_task_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.task_purpose = Some(purpose.into());
        self
    }

    /// Build the search query: name, context, and purpose joined by
    /// single spaces, skipping absent parts.
    pub fn query(&self) -> String {
        let mut query = self.name.clone();
        if let Some(context) = &self.identifier_context {
            query.push(' ');
            query.push_str(context);
        }
        if let Some(purpose) = &self.task_purpose {
            query.push(' ');
            query.push_str(purpose);
        }
        query
    }
}

/// One field the extraction stage should retain.
///
/// A list of these forms the schema for a run. Names must be unique
/// within a schema; order is insertion order and does not affect
/// extraction correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainField {
    /// Field name, unique within a schema
    pub name: String,

    /// What the field means, passed to the extraction backend
    pub description: String,

    /// Optional example value to steer extraction
    pub example: Option<String>,
}

impl RetainField {
    /// Create a new field to retain.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            example: None,
        }
    }

    /// Add an example value.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }
}
