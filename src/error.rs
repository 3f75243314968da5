use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("mcp error: {0}")]
    Mcp(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Not enough parameters provided for {tool}: missing `{parameter}`")]
    ArgumentShortage { tool: String, parameter: String },

    #[error("Too many parameters provided for {tool}: expected {expected}, got {given}")]
    ExcessArguments {
        tool: String,
        expected: usize,
        given: usize,
    },

    #[error("cannot convert `{value}` to {expected} for parameter `{parameter}` of {tool}")]
    TypeCoercion {
        tool: String,
        parameter: String,
        expected: &'static str,
        value: String,
    },

    #[error("response is neither a FUNCTION_CALL nor a FINAL_ANSWER: `{0}`")]
    MalformedDirective(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
