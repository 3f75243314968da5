//! Maps positional directive arguments onto a tool's schema and invokes it.

use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::tool::{ParamType, ToolDescriptor, ToolHost, ToolOutput, ToolRegistry};

/// A completed tool call: what was sent and what came back.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub output: ToolOutput,
}

impl Dispatched {
    /// Compact JSON rendering of the coerced arguments.
    pub fn arguments_display(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// Converts raw positional arguments into the types `tool` declares.
///
/// Each declared parameter consumes exactly one argument, in declaration order.
pub fn coerce(tool: &ToolDescriptor, raw_args: &[String]) -> Result<Map<String, Value>> {
    let mut remaining = raw_args.iter();
    let mut arguments = Map::new();

    for param in &tool.params {
        let raw = remaining.next().ok_or_else(|| AgentError::ArgumentShortage {
            tool: tool.name.clone(),
            parameter: param.name.clone(),
        })?;
        tracing::debug!(
            parameter = %param.name,
            value = %raw,
            kind = param.kind.as_str(),
            "converting parameter"
        );
        let value = coerce_value(tool, &param.name, &param.kind, raw)?;
        arguments.insert(param.name.clone(), value);
    }

    if raw_args.len() > tool.params.len() {
        return Err(AgentError::ExcessArguments {
            tool: tool.name.clone(),
            expected: tool.params.len(),
            given: raw_args.len(),
        });
    }

    Ok(arguments)
}

fn coerce_value(
    tool: &ToolDescriptor,
    parameter: &str,
    kind: &ParamType,
    raw: &str,
) -> Result<Value> {
    let raw = raw.trim();
    let mismatch = |expected: &'static str, value: &str| AgentError::TypeCoercion {
        tool: tool.name.clone(),
        parameter: parameter.to_string(),
        expected,
        value: value.to_string(),
    };

    match kind {
        ParamType::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch("integer", raw)),
        ParamType::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch("number", raw)),
        ParamType::Array => {
            let inner = raw.trim_start_matches('[').trim_end_matches(']').trim();
            if inner.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            inner
                .split(',')
                .map(|item| {
                    let item = item.trim();
                    item.parse::<i64>()
                        .map(Value::from)
                        .map_err(|_| mismatch("array of integers", item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        ParamType::String | ParamType::Other(_) | ParamType::Unspecified => {
            Ok(Value::String(raw.to_string()))
        }
    }
}

/// Looks up `name`, coerces `raw_args` and calls the tool on the host.
pub async fn dispatch(
    host: &dyn ToolHost,
    registry: &ToolRegistry,
    name: &str,
    raw_args: &[String],
) -> Result<Dispatched> {
    let tool = registry.get(name).ok_or_else(|| {
        tracing::debug!(available = ?registry.names(), "tool lookup failed");
        AgentError::UnknownTool(name.to_string())
    })?;
    tracing::debug!(tool = %tool.name, params = ?tool.params, "found tool");

    let arguments = coerce(tool, raw_args)?;
    let payload = Value::Object(arguments.clone());
    tracing::debug!(tool = %name, arguments = %payload, "calling tool");

    let output = host.call_tool(name, payload).await?;
    tracing::debug!(tool = %name, ?output, "tool returned");

    Ok(Dispatched {
        name: name.to_string(),
        arguments,
        output,
    })
}
