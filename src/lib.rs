//! A step-by-step agent loop over MCP server tools.
//!
//! The crate provides:
//! - An MCP client (`mcp`) acting as the tool host behind the `ToolHost` trait.
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - An `Agent` that asks the model for one `FUNCTION_CALL:` or `FINAL_ANSWER:` line
//!   per iteration, coerces the call's arguments to the tool schema and feeds the
//!   result back until a final answer or the iteration cap.

mod agent;
mod config;
mod directive;
mod dispatch;
mod error;
mod llm;
pub mod mcp;
mod prompt;
mod sink;
mod telemetry;
mod tool;

pub use agent::{Agent, DoneReason, IterationState, RunOutcome, Step};
pub use config::{
    AgentConfig, AppConfig, LogFormat, LoggingConfig, MalformedPolicy, McpConfig, ModelConfig,
    TransportKind, DEFAULT_QUERY,
};
pub use directive::{parse as parse_directive, Directive};
pub use dispatch::{coerce, dispatch, Dispatched};
pub use error::{AgentError, Result};
pub use llm::{from_config as model_from_config, LanguageModel, OpenAIClient, StubModel};
pub use prompt::PromptComposer;
pub use sink::{persistable_text, FinalAnswerSink, ToolSink};
pub use telemetry::init_tracing;
pub use tool::{describe, ParamSpec, ParamType, ToolDescriptor, ToolHost, ToolOutput, ToolRegistry};
