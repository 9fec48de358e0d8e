/// In-process tool and resource registry
///
/// Maps tool names to registered handlers and resource URIs (or URI templates)
/// to reader functions. The MCP server dispatches through a registry, and the
/// registry is itself a `ToolProvider` so a session can run against local tools.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::{ProviderError, ToolArguments, ToolDefinition, ToolOutput, ToolProvider};

/// Errors a tool handler can report
///
/// These never abort a session; they are relayed as error tool results.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// A single callable tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and input schema of this tool
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with the raw JSON arguments
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError>;
}

/// Errors raised while building a registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Resource '{0}' is already registered")]
    DuplicateResource(String),
}

/// Parameters extracted from a resource URI template
pub type ResourceParams = HashMap<String, String>;

type ResourceReader =
    Arc<dyn Fn(ResourceParams) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A concrete resource exposed by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

/// A parameterized family of resources, e.g. `sqlite://table/{table_name}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

/// Registry of tools and resources, kept in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolDefinition, Arc<dyn ToolHandler>)>,
    index: HashMap<String, usize>,
    resources: Vec<(ResourceDescriptor, ResourceReader)>,
    templates: Vec<(ResourceTemplateDescriptor, ResourceReader)>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler; names must be unique
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> Result<(), RegistryError> {
        let definition = handler.definition();
        if self.index.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name));
        }

        tracing::debug!("Registered tool: {}", definition.name);
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push((definition, Arc::new(handler)));
        Ok(())
    }

    /// Register a resource with a fixed URI
    pub fn register_resource<F>(
        &mut self,
        uri: &str,
        name: &str,
        description: Option<&str>,
        reader: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ResourceParams) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync + 'static,
    {
        if self.resources.iter().any(|(r, _)| r.uri == uri) {
            return Err(RegistryError::DuplicateResource(uri.to_string()));
        }

        let descriptor = ResourceDescriptor {
            uri: uri.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            mime_type: default_mime_type(),
        };
        self.resources.push((descriptor, Arc::new(reader)));
        Ok(())
    }

    /// Register a resource template whose `{param}` segments are passed to the reader
    pub fn register_resource_template<F>(
        &mut self,
        uri_template: &str,
        name: &str,
        description: Option<&str>,
        reader: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ResourceParams) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync + 'static,
    {
        if self.templates.iter().any(|(t, _)| t.uri_template == uri_template) {
            return Err(RegistryError::DuplicateResource(uri_template.to_string()));
        }

        let descriptor = ResourceTemplateDescriptor {
            uri_template: uri_template.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            mime_type: default_mime_type(),
        };
        self.templates.push((descriptor, Arc::new(reader)));
        Ok(())
    }

    /// Tool definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|(def, _)| def.clone()).collect()
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.resources.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        self.templates.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    ///
    /// Handler failures come back as error outputs; only an unregistered name
    /// is reported as a provider error.
    pub async fn execute(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> Result<ToolOutput, ProviderError> {
        let handler = match self.index.get(name) {
            Some(&i) => Arc::clone(&self.tools[i].1),
            None => return Err(ProviderError::UnknownTool(name.to_string())),
        };

        match handler.call(arguments).await {
            Ok(text) => Ok(ToolOutput::text(text)),
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                Ok(ToolOutput::error(format!("Error: {}", e)))
            }
        }
    }

    /// Read a resource by URI, trying fixed URIs before templates
    ///
    /// Returns `None` when no resource matches the URI.
    pub async fn read_resource(&self, uri: &str) -> Option<Result<String, ToolError>> {
        if let Some((_, reader)) = self.resources.iter().find(|(r, _)| r.uri == uri) {
            return Some(reader(ResourceParams::new()).await);
        }

        for (template, reader) in &self.templates {
            if let Some(params) = match_uri_template(&template.uri_template, uri) {
                return Some(reader(params).await);
            }
        }

        None
    }
}

#[async_trait]
impl ToolProvider for ToolRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        Ok(self.definitions())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &ToolArguments,
    ) -> Result<ToolOutput, ProviderError> {
        self.execute(name, arguments.clone()).await
    }
}

/// Deserialize a tool's typed parameters from its raw arguments
pub fn parse_arguments<T: DeserializeOwned>(arguments: ToolArguments) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// JSON schema for a parameter struct, in the shape tool definitions expect
pub fn input_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

/// Match a URI against a template with `{name}` placeholders
///
/// Each placeholder captures a non-empty run of characters without `/`.
pub fn match_uri_template(template: &str, uri: &str) -> Option<ResourceParams> {
    let mut params = ResourceParams::new();
    let mut rest_template = template;
    let mut rest_uri = uri;

    while !rest_template.is_empty() {
        if let Some(after_brace) = rest_template.strip_prefix('{') {
            let close = after_brace.find('}')?;
            let name = &after_brace[..close];
            rest_template = &after_brace[close + 1..];

            let literal_end = rest_template.find('{').unwrap_or(rest_template.len());
            let next_literal = &rest_template[..literal_end];
            let value_end = if next_literal.is_empty() {
                rest_uri.len()
            } else {
                rest_uri.find(next_literal)?
            };

            let value = &rest_uri[..value_end];
            if value.is_empty() || value.contains('/') {
                return None;
            }
            params.insert(name.to_string(), value.to_string());
            rest_uri = &rest_uri[value_end..];
        } else {
            let literal_end = rest_template.find('{').unwrap_or(rest_template.len());
            rest_uri = rest_uri.strip_prefix(&rest_template[..literal_end])?;
            rest_template = &rest_template[literal_end..];
        }
    }

    if rest_uri.is_empty() {
        Some(params)
    } else {
        None
    }
}
