//! Optional persistence of a finished run's result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::{DoneReason, RunOutcome};
use crate::error::Result;
use crate::tool::{ToolHost, ToolOutput};

/// Receives the outcome after the loop has stopped.
#[async_trait]
pub trait FinalAnswerSink: Send + Sync {
    /// Returns what the sink produced, or `None` when there was nothing to record.
    async fn persist(&self, outcome: &RunOutcome) -> Result<Option<ToolOutput>>;
}

/// Text worth recording: the answer itself, or the last tool result when the
/// run hit the iteration cap. Errored runs record nothing.
pub fn persistable_text(outcome: &RunOutcome) -> Option<String> {
    match &outcome.reason {
        DoneReason::FinalAnswer(value) => Some(value.clone()),
        DoneReason::MaxIterations => outcome.state.last_result.as_ref().map(ToolOutput::render),
        DoneReason::Error(_) => None,
    }
}

/// Records the result by calling a tool on the host, e.g. `write_to_writer`.
pub struct ToolSink {
    host: Arc<dyn ToolHost>,
    tool: String,
    argument: String,
}

impl ToolSink {
    pub fn new(
        host: Arc<dyn ToolHost>,
        tool: impl Into<String>,
        argument: impl Into<String>,
    ) -> Self {
        Self {
            host,
            tool: tool.into(),
            argument: argument.into(),
        }
    }
}

#[async_trait]
impl FinalAnswerSink for ToolSink {
    async fn persist(&self, outcome: &RunOutcome) -> Result<Option<ToolOutput>> {
        let Some(text) = persistable_text(outcome) else {
            return Ok(None);
        };
        let mut arguments = Map::new();
        arguments.insert(self.argument.clone(), Value::String(text));
        tracing::info!(tool = %self.tool, "recording result");
        let output = self.host.call_tool(&self.tool, Value::Object(arguments)).await?;
        tracing::info!(output = %output.render(), "result recorded");
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::IterationState;
    use crate::tool::ToolDescriptor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolHost for Recorder {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push((name.to_string(), arguments));
            Ok(ToolOutput::Structured(vec!["written".into()]))
        }
    }

    fn outcome(reason: DoneReason, last: Option<ToolOutput>) -> RunOutcome {
        RunOutcome {
            reason,
            state: IterationState {
                iteration: 3,
                last_result: last,
                history: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn writes_final_answer() {
        let host = Arc::new(Recorder::default());
        let sink = ToolSink::new(host.clone(), "write_to_writer", "output");

        let written = sink
            .persist(&outcome(DoneReason::FinalAnswer("[42]".into()), None))
            .await
            .unwrap();

        assert_eq!(written, Some(ToolOutput::Structured(vec!["written".into()])));
        let calls = host.calls.lock().unwrap();
        assert_eq!(calls[0].0, "write_to_writer");
        assert_eq!(calls[0].1, serde_json::json!({"output": "[42]"}));
    }

    #[tokio::test]
    async fn falls_back_to_last_result_at_cap() {
        let host = Arc::new(Recorder::default());
        let sink = ToolSink::new(host.clone(), "write_to_writer", "output");
        let last = ToolOutput::Structured(vec!["7.59982224609308e+33".into()]);

        sink.persist(&outcome(DoneReason::MaxIterations, Some(last)))
            .await
            .unwrap();

        let calls = host.calls.lock().unwrap();
        assert_eq!(calls[0].1["output"], "[7.59982224609308e+33]");
    }

    #[tokio::test]
    async fn skips_errored_runs() {
        let host = Arc::new(Recorder::default());
        let sink = ToolSink::new(host.clone(), "write_to_writer", "output");
        let written = sink
            .persist(&outcome(DoneReason::Error("boom".into()), None))
            .await
            .unwrap();
        assert!(written.is_none());
        assert!(host.calls.lock().unwrap().is_empty());
        assert_eq!(persistable_text(&outcome(DoneReason::MaxIterations, None)), None);
    }
}
