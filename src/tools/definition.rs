// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool definition types
//!
//! A tool is described to the model as a name, a description, and a
//! JSON Schema for its arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a registry
    pub name: String,

    /// Human-readable description shown to the model
    pub description: String,

    /// Argument schema (JSON Schema)
    pub input_schema: ToolInputSchema,
}

impl ToolDefinition {
    /// Create a definition with an empty argument schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: SchemaBuilder::new().build(),
        }
    }

    /// Set the argument schema
    pub fn with_schema(mut self, schema: ToolInputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Argument schema for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Property definitions
    pub properties: Value,

    /// Required property names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// Builder for tool argument schemas
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({"type": "string", "description": description}),
            required,
        )
    }

    /// Add an integer property
    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({"type": "integer", "description": description}),
            required,
        )
    }

    /// Add a boolean property
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({"type": "boolean", "description": description}),
            required,
        )
    }

    /// Add an array property with a given item type
    pub fn array(self, name: &str, description: &str, item_type: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "array",
                "description": description,
                "items": {"type": item_type}
            }),
            required,
        )
    }

    /// Build the schema
    pub fn build(self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Value::Object(self.properties),
            required: self.required,
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_schema() {
        let schema = SchemaBuilder::new().build();
        assert_eq!(schema.schema_type, "object");
        assert!(schema.required.is_empty());
    }

    #[test]
    fn test_required_tracking() {
        let schema = SchemaBuilder::new()
            .string("query", "Search query", true)
            .integer("limit", "Max results", false)
            .build();
        assert_eq!(schema.required, vec!["query"]);
        assert!(schema.properties["limit"]["type"] == "integer");
    }

    #[test]
    fn test_array_items() {
        let schema = SchemaBuilder::new()
            .array("tags", "Tag list", "string", true)
            .build();
        assert_eq!(schema.properties["tags"]["items"]["type"], "string");
    }

    #[test]
    fn test_schema_serializes_without_empty_required() {
        let schema = SchemaBuilder::new().boolean("flag", "A flag", false).build();
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json.get("required").is_none());
        assert_eq!(json["type"], "object");
    }

    #[test]
    fn test_definition_builder() {
        let def = ToolDefinition::new("lookup", "Look things up")
            .with_schema(SchemaBuilder::new().string("key", "Key", true).build());
        assert_eq!(def.name, "lookup");
        assert_eq!(def.input_schema.required, vec!["key"]);
    }
}
