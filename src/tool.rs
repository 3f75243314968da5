//! Tool descriptors fetched from the tool host and the boundary trait used to reach it.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

const NO_DESCRIPTION: &str = "No description available";

/// Type a tool parameter is declared with in its input schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Number,
    Array,
    String,
    /// Any other declared type, kept verbatim. Coerced as text.
    Other(String),
    /// The schema entry carries no `type` at all. Coerced as text.
    Unspecified,
}

impl ParamType {
    pub fn from_schema(entry: &Value) -> Self {
        match entry.get("type").and_then(Value::as_str) {
            Some("integer") => ParamType::Integer,
            Some("number") => ParamType::Number,
            Some("array") => ParamType::Array,
            Some("string") => ParamType::String,
            Some(other) => ParamType::Other(other.to_string()),
            None => ParamType::Unspecified,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Array => "array",
            ParamType::String => "string",
            ParamType::Other(raw) => raw,
            ParamType::Unspecified => "unknown",
        }
    }
}

/// A single declared parameter, in schema declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
}

/// Metadata describing one tool exposed by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// Builds a descriptor from an MCP `inputSchema`. Property order follows the
    /// order the host declared them in.
    pub fn from_schema(
        name: impl Into<String>,
        description: Option<String>,
        input_schema: &Value,
    ) -> Self {
        let params = input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, entry)| ParamSpec {
                        name: name.clone(),
                        kind: ParamType::from_schema(entry),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description,
            params,
        }
    }

    /// Renders `name(a: integer, b: integer) - description`.
    pub fn signature(&self) -> String {
        let params = if self.params.is_empty() {
            "no parameters".to_string()
        } else {
            self.params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.kind.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let description = self.description.as_deref().unwrap_or(NO_DESCRIPTION);
        format!("{}({}) - {}", self.name, params, description)
    }
}

/// What a tool invocation returned, decided once at the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// The host replied with a content sequence; one string per item.
    Structured(Vec<String>),
    /// The host replied with something else, rendered as text.
    Opaque(String),
}

impl ToolOutput {
    /// Normalizes a raw `tools/call` result.
    pub fn from_call_result(result: &Value) -> Self {
        match result.get("content") {
            Some(Value::Array(items)) => ToolOutput::Structured(
                items
                    .iter()
                    .map(|item| match item.get("text").and_then(Value::as_str) {
                        Some(text) => text.to_string(),
                        None => item.to_string(),
                    })
                    .collect(),
            ),
            Some(Value::String(text)) => ToolOutput::Opaque(text.clone()),
            Some(other) => ToolOutput::Opaque(other.to_string()),
            None => ToolOutput::Opaque(match result {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        }
    }

    pub fn render(&self) -> String {
        match self {
            ToolOutput::Structured(items) => format!("[{}]", items.join(", ")),
            ToolOutput::Opaque(text) => text.clone(),
        }
    }
}

/// The external process that lists and executes tools.
#[async_trait]
pub trait ToolHost: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput>;
}

/// Tools fetched from the host for one run.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Queries the host. Order is preserved and duplicates are kept.
    pub async fn fetch(host: &dyn ToolHost) -> Result<Self> {
        let tools = host.list_tools().await?;
        tracing::info!(count = tools.len(), "retrieved tools from host");
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn describe(&self) -> String {
        describe(&self.tools)
    }
}

/// One numbered line per tool, joined by newlines.
pub fn describe(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .enumerate()
        .map(|(index, tool)| {
            let line = format!("{}. {}", index + 1, tool.signature());
            tracing::debug!(tool = %tool.name, "added description: {line}");
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
