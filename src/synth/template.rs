//! In-memory CloudFormation template model.
//!
//! Stacks build a `Template` resource by resource and the synth command
//! serializes it to CloudFormation JSON. The lookup helpers at the bottom
//! exist for template assertions in tests.

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// What CloudFormation does with a resource when its stack is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Retain,
    Delete,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Delete => "Delete",
        }
    }
}

/// A single CloudFormation resource
#[derive(Debug, Clone)]
pub struct Resource {
    pub resource_type: String,
    pub properties: Value,
    pub deletion_policy: Option<RemovalPolicy>,
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            deletion_policy: None,
            depends_on: Vec::new(),
        }
    }

    /// Set the deletion policy (also applied as the update-replace policy)
    pub fn with_deletion_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    /// Add an explicit creation-order dependency
    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }
}

/// A CloudFormation stack output, optionally exported for cross-stack imports
#[derive(Debug, Clone)]
pub struct TemplateOutput {
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl TemplateOutput {
    pub fn new(value: Value, description: &str) -> Self {
        Self {
            value,
            description: Some(description.to_string()),
            export_name: None,
        }
    }

    pub fn exported(mut self, name: &str) -> Self {
        self.export_name = Some(name.to_string());
        self
    }
}

/// An in-memory CloudFormation template
#[derive(Debug, Default)]
pub struct Template {
    description: String,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, TemplateOutput>,
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource under a logical id. Duplicate ids are an error.
    pub fn add(&mut self, logical_id: &str, resource: Resource) -> Result<()> {
        if self.resources.contains_key(logical_id) {
            anyhow::bail!("Duplicate logical id '{}' in template", logical_id);
        }
        self.resources.insert(logical_id.to_string(), resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, output: TemplateOutput) {
        self.outputs.insert(name.to_string(), output);
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Serialize to CloudFormation JSON
    pub fn to_json(&self) -> Value {
        let mut resources = serde_json::Map::new();
        for (id, resource) in &self.resources {
            let mut entry = serde_json::Map::new();
            entry.insert("Type".to_string(), json!(resource.resource_type));
            entry.insert("Properties".to_string(), resource.properties.clone());
            if !resource.depends_on.is_empty() {
                entry.insert("DependsOn".to_string(), json!(resource.depends_on));
            }
            if let Some(policy) = resource.deletion_policy {
                entry.insert("DeletionPolicy".to_string(), json!(policy.as_str()));
                entry.insert("UpdateReplacePolicy".to_string(), json!(policy.as_str()));
            }
            resources.insert(id.clone(), Value::Object(entry));
        }

        let mut template = serde_json::Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!("2010-09-09"),
        );
        template.insert("Description".to_string(), json!(self.description));
        template.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let mut outputs = serde_json::Map::new();
            for (name, output) in &self.outputs {
                let mut entry = serde_json::Map::new();
                entry.insert("Value".to_string(), output.value.clone());
                if let Some(description) = &output.description {
                    entry.insert("Description".to_string(), json!(description));
                }
                if let Some(export) = &output.export_name {
                    entry.insert("Export".to_string(), json!({ "Name": export }));
                }
                outputs.insert(name.clone(), Value::Object(entry));
            }
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(template)
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    // ------------------------------------------------------------------
    // Lookup helpers for template assertions
    // ------------------------------------------------------------------

    /// Number of resources of the given CloudFormation type
    #[allow(dead_code)]
    pub fn resource_count_of(&self, resource_type: &str) -> usize {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .count()
    }

    /// All resources of the given type, with their logical ids
    #[allow(dead_code)]
    pub fn find_resources(&self, resource_type: &str) -> Vec<(&str, &Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    /// Look up a resource by logical id
    #[allow(dead_code)]
    pub fn get_resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Whether any resource of the given type has properties containing
    /// the expected subset (recursive; see `is_subset`)
    #[allow(dead_code)]
    pub fn has_resource_properties(&self, resource_type: &str, expected: &Value) -> bool {
        self.resources
            .values()
            .any(|r| r.resource_type == resource_type && is_subset(expected, &r.properties))
    }
}

/// Recursive subset match: every key of an expected object must match in the
/// actual object; every element of an expected array must match some element
/// of the actual array; leaves compare by equality.
#[allow(dead_code)]
pub fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            expected_map.iter().all(|(key, expected_value)| {
                actual_map
                    .get(key)
                    .is_some_and(|actual_value| is_subset(expected_value, actual_value))
            })
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            expected_items.iter().all(|expected_item| {
                actual_items
                    .iter()
                    .any(|actual_item| is_subset(expected_item, actual_item))
            })
        }
        _ => expected == actual,
    }
}
