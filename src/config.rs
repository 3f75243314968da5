use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub const DEFAULT_QUERY: &str =
    "Find the ASCII values of characters in INDIA and then return sum of exponentials of those values";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            organization: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4".into()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpConfig {
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            command: default_command(),
            args: default_args(),
            env: HashMap::new(),
            url: None,
        }
    }
}

fn default_command() -> String {
    "python".into()
}

fn default_args() -> Vec<String> {
    vec!["example_mcp_server.py".into()]
}

/// What the loop does with a response that is neither directive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Advance without recording anything.
    Ignore,
    /// Record a corrective note in the history and advance.
    #[default]
    Notice,
    /// End the run with an error.
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
    #[serde(default)]
    pub final_answer_tool: Option<String>,
    #[serde(default = "default_final_answer_arg")]
    pub final_answer_arg: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            query: default_query(),
            on_malformed: MalformedPolicy::default(),
            final_answer_tool: None,
            final_answer_arg: default_final_answer_arg(),
        }
    }
}

fn default_max_iterations() -> usize {
    3
}

fn default_query() -> String {
    DEFAULT_QUERY.into()
}

fn default_final_answer_arg() -> String {
    "output".into()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| AgentError::Config(format!("Failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = env::var("SAYR_API_KEY").or_else(|_| env::var("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Ok(provider) = env::var("SAYR_PROVIDER") {
            self.model.provider = provider;
        }
        if let Ok(model) = env::var("SAYR_MODEL") {
            self.model.model = model;
        }
        if let Ok(base_url) = env::var("SAYR_BASE_URL") {
            self.model.base_url = Some(base_url);
        }
        if let Ok(org) = env::var("SAYR_OPENAI_ORG") {
            self.model.organization = Some(org);
        }
        // A new command never inherits the arguments meant for the old one.
        if let Ok(command) = env::var("SAYR_MCP_COMMAND") {
            self.mcp.transport = TransportKind::Stdio;
            self.mcp.command = command;
            self.mcp.args.clear();
        }
        if let Ok(args) = env::var("SAYR_MCP_ARGS") {
            self.mcp.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(url) = env::var("SAYR_MCP_URL") {
            self.mcp.transport = TransportKind::Http;
            self.mcp.url = Some(url);
        }
        if let Ok(max) = env::var("SAYR_MAX_ITERATIONS") {
            self.agent.max_iterations = max.parse::<usize>().map_err(|err| {
                AgentError::Config(format!("SAYR_MAX_ITERATIONS `{max}` is not a count: {err}"))
            })?;
        }
        if let Ok(query) = env::var("SAYR_QUERY") {
            self.agent.query = query;
        }
        if let Ok(level) = env::var("SAYR_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }
}
