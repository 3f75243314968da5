use std::sync::Arc;

use crate::config::{AgentConfig, MalformedPolicy};
use crate::directive::{self, Directive};
use crate::dispatch;
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::prompt::PromptComposer;
use crate::tool::{ToolHost, ToolOutput, ToolRegistry};

/// Everything the loop knows between iterations. Owned by one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationState {
    pub iteration: usize,
    pub last_result: Option<ToolOutput>,
    pub history: Vec<String>,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum DoneReason {
    FinalAnswer(String),
    Error(String),
    MaxIterations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub reason: DoneReason,
    pub state: IterationState,
}

impl RunOutcome {
    pub fn final_answer(&self) -> Option<&str> {
        match &self.reason {
            DoneReason::FinalAnswer(value) => Some(value),
            _ => None,
        }
    }
}

/// Result of one pass through the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue(IterationState),
    Done(RunOutcome),
}

/// Drives the model and the tool host until a final answer, an error, or the
/// iteration cap.
pub struct Agent {
    model: Arc<dyn LanguageModel>,
    host: Arc<dyn ToolHost>,
    tools: ToolRegistry,
    composer: PromptComposer,
    query: String,
    max_iterations: usize,
    on_malformed: MalformedPolicy,
}

impl Agent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        host: Arc<dyn ToolHost>,
        tools: ToolRegistry,
        query: impl Into<String>,
    ) -> Self {
        let composer = PromptComposer::new(&tools.describe());
        Self {
            model,
            host,
            tools,
            composer,
            query: query.into(),
            max_iterations: 3,
            on_malformed: MalformedPolicy::default(),
        }
    }

    /// Fetches the tool list from `host` and applies the agent settings.
    pub async fn connect(
        model: Arc<dyn LanguageModel>,
        host: Arc<dyn ToolHost>,
        cfg: &AgentConfig,
    ) -> Result<Self> {
        let tools = ToolRegistry::fetch(host.as_ref()).await?;
        let mut agent = Self::new(model, host, tools, cfg.query.clone())
            .with_max_iterations(cfg.max_iterations)
            .with_malformed_policy(cfg.on_malformed);
        if let Some(tool) = &cfg.final_answer_tool {
            agent.composer =
                PromptComposer::with_final_answer_tool(&agent.tools.describe(), tool);
        }
        Ok(agent)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn system_prompt(&self) -> &str {
        self.composer.system_prompt()
    }

    /// Runs from a fresh state until a terminal step.
    pub async fn run(&self) -> RunOutcome {
        tracing::info!(max_iterations = self.max_iterations, "starting iteration loop");
        let mut state = IterationState::default();
        loop {
            match self.step(state).await {
                Step::Continue(next) => state = next,
                Step::Done(outcome) => {
                    match &outcome.reason {
                        DoneReason::FinalAnswer(value) => {
                            tracing::info!(answer = %value, "agent execution complete")
                        }
                        DoneReason::Error(err) => {
                            tracing::error!(error = %err, "run ended with an error")
                        }
                        DoneReason::MaxIterations => tracing::warn!(
                            last_result = ?outcome.state.last_result,
                            "reached max iterations"
                        ),
                    }
                    return outcome;
                }
            }
        }
    }

    /// One model exchange and, when asked for, one tool call.
    pub async fn step(&self, mut state: IterationState) -> Step {
        if state.iteration >= self.max_iterations {
            return done(DoneReason::MaxIterations, state);
        }
        let number = state.iteration + 1;
        tracing::info!(iteration = number, "--- iteration ---");

        let query = self.composer.query(&self.query, &state.history);
        let prompt = self.composer.prompt(&query);
        let response = match self.model.complete(&prompt, self.composer.system_prompt()).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "failed to get model response");
                return done(DoneReason::Error(err.to_string()), state);
            }
        };
        tracing::info!(response = %response, "model response");

        match directive::parse(&response) {
            Ok(Directive::Final { value }) => done(DoneReason::FinalAnswer(value), state),
            Ok(Directive::Call { name, raw_args }) => {
                match dispatch::dispatch(self.host.as_ref(), &self.tools, &name, &raw_args).await {
                    Ok(call) => {
                        state.history.push(format!(
                            "In the {number} iteration you called {} with {} parameters, and the function returned {}.",
                            call.name,
                            call.arguments_display(),
                            call.output.render()
                        ));
                        state.last_result = Some(call.output);
                        state.iteration += 1;
                        Step::Continue(state)
                    }
                    Err(err) => fail(state, number, err),
                }
            }
            Err(err @ AgentError::MalformedDirective(_)) => match self.on_malformed {
                MalformedPolicy::Ignore => {
                    tracing::warn!(error = %err, "ignoring unrecognized response");
                    state.iteration += 1;
                    Step::Continue(state)
                }
                MalformedPolicy::Notice => {
                    tracing::warn!(error = %err, "unrecognized response, telling the model");
                    state.history.push(format!(
                        "In the {number} iteration your response was not a valid FUNCTION_CALL or FINAL_ANSWER line."
                    ));
                    state.iteration += 1;
                    Step::Continue(state)
                }
                MalformedPolicy::Fatal => fail(state, number, err),
            },
            Err(err) => fail(state, number, err),
        }
    }
}

fn done(reason: DoneReason, state: IterationState) -> Step {
    Step::Done(RunOutcome { reason, state })
}

fn fail(mut state: IterationState, number: usize, err: AgentError) -> Step {
    tracing::error!(iteration = number, error = %err, "iteration failed");
    state.history.push(format!("Error in iteration {number}: {err}"));
    done(DoneReason::Error(err.to_string()), state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;
    use crate::tool::ToolDescriptor;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Adder;

    #[async_trait]
    impl ToolHost for Adder {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Ok(vec![ToolDescriptor::from_schema(
                "add",
                Some("Add two numbers".into()),
                &json!({"properties":{"a":{"type":"integer"},"b":{"type":"integer"}}}),
            )])
        }

        async fn call_tool(&self, _name: &str, arguments: Value) -> Result<ToolOutput> {
            let a = arguments["a"].as_i64().unwrap_or(0);
            let b = arguments["b"].as_i64().unwrap_or(0);
            let sum = a + b;
            Ok(ToolOutput::Structured(vec![sum.to_string()]))
        }
    }

    async fn agent(responses: &[&str], policy: MalformedPolicy) -> (Agent, Arc<StubModel>) {
        let model = StubModel::new(responses.iter().map(|r| r.to_string()).collect());
        let host: Arc<dyn ToolHost> = Arc::new(Adder);
        let tools = ToolRegistry::fetch(host.as_ref()).await.unwrap();
        let agent = Agent::new(model.clone(), host, tools, "add 5 and 3")
            .with_malformed_policy(policy);
        (agent, model)
    }

    #[tokio::test]
    async fn step_stops_at_cap_without_calling_model() {
        let (agent, model) = agent(&[], MalformedPolicy::Notice).await;
        let state = IterationState {
            iteration: 3,
            ..IterationState::default()
        };
        match agent.step(state).await {
            Step::Done(outcome) => assert_eq!(outcome.reason, DoneReason::MaxIterations),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn second_prompt_carries_history() {
        let (agent, model) = agent(
            &["FUNCTION_CALL: add|5|3", "FINAL_ANSWER: [8]"],
            MalformedPolicy::Notice,
        )
        .await;
        let outcome = agent.run().await;

        assert_eq!(outcome.final_answer(), Some("[8]"));
        let prompts = model.prompts();
        assert!(prompts[0].ends_with("Query: add 5 and 3"));
        assert!(prompts[1].ends_with(concat!(
            "Query: add 5 and 3\n\nIn the 1 iteration you called add with ",
            "{\"a\":5,\"b\":3} parameters, and the function returned [8].  What should I do next?"
        )));
    }

    #[tokio::test]
    async fn notice_policy_records_and_advances() {
        let (agent, _) = agent(
            &["I think the answer is 8", "FINAL_ANSWER: [8]"],
            MalformedPolicy::Notice,
        )
        .await;
        let outcome = agent.run().await;
        assert_eq!(outcome.final_answer(), Some("[8]"));
        assert_eq!(outcome.state.iteration, 1);
        assert_eq!(outcome.state.history.len(), 1);
        assert!(outcome.state.history[0].contains("not a valid FUNCTION_CALL"));
    }

    #[tokio::test]
    async fn ignore_policy_advances_silently() {
        let responses = ["hmm", "still thinking", "no idea"];
        let (agent, _) = agent(&responses, MalformedPolicy::Ignore).await;
        let outcome = agent.run().await;
        assert_eq!(outcome.reason, DoneReason::MaxIterations);
        assert_eq!(outcome.state.iteration, 3);
        assert!(outcome.state.history.is_empty());
    }

    #[tokio::test]
    async fn fatal_policy_ends_run() {
        let (agent, _) = agent(&["hmm"], MalformedPolicy::Fatal).await;
        let outcome = agent.run().await;
        assert!(matches!(outcome.reason, DoneReason::Error(_)));
        assert_eq!(outcome.state.history.len(), 1);
        assert!(outcome.state.history[0].starts_with("Error in iteration 1:"));
    }

    #[tokio::test]
    async fn model_failure_records_nothing() {
        let (agent, _) = agent(&[], MalformedPolicy::Notice).await;
        let outcome = agent.run().await;
        assert!(matches!(outcome.reason, DoneReason::Error(_)));
        assert!(outcome.state.history.is_empty());
        assert_eq!(outcome.state.iteration, 0);
    }

    #[tokio::test]
    async fn connect_applies_config() {
        let model = StubModel::new(vec![]);
        let cfg = AgentConfig {
            max_iterations: 0,
            final_answer_tool: Some("write_to_writer".into()),
            ..AgentConfig::default()
        };
        let agent = Agent::connect(model, Arc::new(Adder), &cfg).await.unwrap();
        assert!(agent
            .system_prompt()
            .contains("1. add(a: integer, b: integer) - Add two numbers"));
        assert!(agent.system_prompt().contains("`write_to_writer` tool"));
        assert_eq!(agent.run().await.reason, DoneReason::MaxIterations);
    }

    struct Unreachable;

    #[async_trait]
    impl ToolHost for Unreachable {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Err(AgentError::Transport("connection refused".into()))
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<ToolOutput> {
            panic!("{name} called on a host that never listed tools")
        }
    }

    #[tokio::test]
    async fn connect_fails_when_tool_listing_fails() {
        let model = StubModel::new(vec!["FINAL_ANSWER: [8]".into()]);
        let cfg = AgentConfig::default();
        let result = Agent::connect(model.clone(), Arc::new(Unreachable), &cfg).await;

        match result.err() {
            Some(AgentError::Transport(message)) => assert_eq!(message, "connection refused"),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(model.prompts().is_empty());
    }
}
