//! System prompt and per-iteration query assembly.

/// Appended to the history when asking the model for its next step.
pub const NEXT_STEP_SUFFIX: &str = "  What should I do next?";

/// Builds the prompts sent to the model during one run.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_prompt: String,
}

impl PromptComposer {
    pub fn new(tools_description: &str) -> Self {
        Self {
            system_prompt: system_prompt(tools_description, None),
        }
    }

    /// Also instructs the model to record its result with `tool` before finishing.
    pub fn with_final_answer_tool(tools_description: &str, tool: &str) -> Self {
        Self {
            system_prompt: system_prompt(tools_description, Some(tool)),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The task verbatim on the first iteration, then the task followed by
    /// everything that happened so far.
    pub fn query(&self, task: &str, history: &[String]) -> String {
        if history.is_empty() {
            return task.to_string();
        }
        format!("{task}\n\n{}{NEXT_STEP_SUFFIX}", history.join(" "))
    }

    pub fn prompt(&self, query: &str) -> String {
        format!("{}\n\nQuery: {query}", self.system_prompt)
    }
}

fn system_prompt(tools_description: &str, final_answer_tool: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a math agent solving problems in iterations. You have access to various \
         mathematical tools to perform step-by-step calculations.\n\n",
    );
    prompt.push_str("Available tools:\n");
    prompt.push_str(tools_description);
    prompt.push_str("\n\nYour task is to:\n");
    prompt.push_str("1. Break the task into smaller steps.\n");
    prompt.push_str("2. Use FUNCTION_CALLs to invoke tools for each step.\n");
    if let Some(tool) = final_answer_tool {
        prompt.push_str(&format!(
            "3. After completing all required calculations, record the result with the `{tool}` tool before giving the FINAL_ANSWER.\n"
        ));
    }
    prompt.push_str(
        "\nYou must respond with EXACTLY ONE line in one of these formats (no additional text):\n",
    );
    prompt.push_str("1. For function calls:\n   FUNCTION_CALL: function_name|param1|param2|...\n\n");
    prompt.push_str("2. For final answers:\n   FINAL_ANSWER: [number]\n\n");
    prompt.push_str("Important:\n");
    prompt.push_str("- When a function returns multiple values, you need to process all of them\n");
    prompt.push_str("- Only give FINAL_ANSWER when you have completed all necessary calculations\n");
    prompt.push_str("- Do not repeat function calls with the same parameters\n\n");
    prompt.push_str("Examples:\n");
    prompt.push_str("- FUNCTION_CALL: add|5|3\n");
    prompt.push_str("- FUNCTION_CALL: strings_to_chars_to_int|INDIA\n");
    prompt.push_str("- FINAL_ANSWER: [42]\n\n");
    prompt.push_str("DO NOT include any explanations or additional text.\n");
    prompt.push_str(
        "Your entire response should be a single line starting with either FUNCTION_CALL: or FINAL_ANSWER:",
    );
    prompt
}
