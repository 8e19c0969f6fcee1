//! Plan/act/observe loop for agent mode.
//!
//! The model is asked to answer in a ReAct style: either an `Action:` naming
//! a tool plus its input, or a `Final Answer:`. Tool output is fed back as an
//! `Observation:` until the model finishes or the step bound is reached.

use crate::error::{NuwaError, Result};
use crate::model::Model;
use crate::parser::ResponseParser;
use crate::prompts::{self, AgentPromptVars};
use crate::providers::TimeProvider;
use crate::script::ScriptMaterializer;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";
pub const DEFAULT_MAX_STEPS: usize = 5;

const STOP_SEQUENCES: [&str; 2] = ["\nObservation:", "\n\tObservation:"];

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Action: (.*?)\nAction_input:").expect("valid regex"));

/// Something the agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, input: &str) -> Result<String>;
}

/// Runs the first script block found in its input.
pub struct ScriptExecutorTool {
    parser: Arc<dyn ResponseParser>,
    scripts: Arc<ScriptMaterializer>,
}

impl ScriptExecutorTool {
    pub fn new(parser: Arc<dyn ResponseParser>, scripts: Arc<ScriptMaterializer>) -> Self {
        Self { parser, scripts }
    }
}

#[async_trait]
impl Tool for ScriptExecutorTool {
    fn name(&self) -> &str {
        "ScriptExecutor"
    }

    fn description(&self) -> &str {
        "Useful for executing shell scripts. The input to this tool should be the script \
         in the @FILENAME.sh@ format followed by a fenced code block."
    }

    async fn call(&self, input: &str) -> Result<String> {
        self.scripts.run_reply(self.parser.as_ref(), input)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAction {
    pub tool: String,
    pub input: String,
    /// The model text that produced the action, replayed in the scratchpad.
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish(String),
}

/// Parses one model turn.
///
/// Output containing the final-answer marker finishes with the text after
/// the last marker. Otherwise an `Action:` line must be present; its input
/// is the whole output so the tool can find the script block itself.
pub fn parse_output(output: &str) -> Result<AgentStep> {
    if output.contains(FINAL_ANSWER_MARKER) {
        let answer = output
            .rsplit(FINAL_ANSWER_MARKER)
            .next()
            .unwrap_or_default()
            .trim();
        return Ok(AgentStep::Finish(answer.to_string()));
    }

    let caps = ACTION
        .captures(output)
        .ok_or_else(|| NuwaError::AgentParse(output.to_string()))?;

    Ok(AgentStep::Action(AgentAction {
        tool: caps[1].trim().to_string(),
        input: output.to_string(),
        log: output.to_string(),
    }))
}

/// Renders the agent prompt and asks the model for the next step.
pub struct Agent {
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
    time: Arc<dyn TimeProvider>,
}

impl Agent {
    pub fn new(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>, time: Arc<dyn TimeProvider>) -> Self {
        Self { model, tools, time }
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    fn tool_descriptions(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}\n", t.name(), t.description()))
            .collect()
    }

    fn tool_names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render(&self, input: &str, scratchpad: &str) -> String {
        prompts::agent_mode_prompt(&AgentPromptVars {
            tools: &self.tool_descriptions(),
            tool_names: &self.tool_names(),
            current_time: &self.time.now_rfc3339(),
            input,
            agent_scratchpad: scratchpad,
        })
    }

    /// Decides the next step given the steps taken so far.
    pub async fn plan(&self, input: &str, steps: &[(AgentAction, String)]) -> Result<AgentStep> {
        let prompt = self.render(input, &scratchpad(steps));
        let output = self.model.generate(&prompt).await?;

        // Models without stop-sequence support run on and invent observations.
        let cut = STOP_SEQUENCES
            .iter()
            .filter_map(|stop| output.find(stop))
            .min()
            .unwrap_or(output.len());
        let output = &output[..cut];
        debug!("Agent output: {}", output);

        parse_output(output)
    }
}

fn scratchpad(steps: &[(AgentAction, String)]) -> String {
    if steps.is_empty() {
        return String::new();
    }

    let mut pad: String = steps
        .iter()
        .map(|(action, observation)| format!("{}\nObservation: {}", action.log, observation))
        .collect();
    pad.push_str("\nThought:");
    pad
}

/// Drives an [`Agent`] until it finishes or runs out of steps.
pub struct AgentExecutor {
    agent: Agent,
    max_steps: usize,
}

impl AgentExecutor {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Runs the loop and returns the final answer.
    ///
    /// Tool failures do not end the run; their message becomes the
    /// observation so the model can react to it.
    ///
    /// # Errors
    ///
    /// [`NuwaError::AgentParse`] for unparseable output,
    /// [`NuwaError::AgentStepLimit`] when no answer arrives in time, and any
    /// model error.
    pub async fn run(&self, input: &str) -> Result<String> {
        let mut steps: Vec<(AgentAction, String)> = Vec::new();

        for step in 1..=self.max_steps {
            let action = match self.agent.plan(input, &steps).await? {
                AgentStep::Finish(answer) => {
                    info!("Agent finished after {} step(s)", step);
                    return Ok(answer);
                }
                AgentStep::Action(action) => action,
            };

            info!("Agent step {}: {}", step, action.tool);
            let observation = self.observe(&action).await;
            steps.push((action, observation));
        }

        Err(NuwaError::AgentStepLimit(self.max_steps))
    }

    async fn observe(&self, action: &AgentAction) -> String {
        let tool = self
            .agent
            .tools()
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(&action.tool));

        match tool {
            Some(tool) => match tool.call(&action.input).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Tool {} failed: {}", tool.name(), e);
                    match e.output() {
                        Some(output) if !output.is_empty() => format!("{}\n{}", e, output),
                        _ => e.to_string(),
                    }
                }
            },
            None => format!("{} is not a valid tool, try another one.", action.tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatMessage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedTime;

    impl TimeProvider for FixedTime {
        fn now(&self) -> u64 {
            1_700_000_000
        }
    }

    /// Replays scripted outputs and records every prompt.
    struct ScriptedModel {
        outputs: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self
                .outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "Thought: still thinking".to_string()))
        }

        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
            unreachable!("agent only generates")
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct EchoTool {
        fail: bool,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "echoes"
        }

        async fn call(&self, input: &str) -> Result<String> {
            if self.fail {
                return Err(NuwaError::Execution {
                    status: "exit status: 1".to_string(),
                    output: "disk full".to_string(),
                });
            }
            Ok(format!("echoed {} bytes", input.len()))
        }
    }

    fn executor(model: Arc<ScriptedModel>, fail: bool) -> AgentExecutor {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool { fail })];
        AgentExecutor::new(Agent::new(model, tools, Arc::new(FixedTime)))
    }

    const ACTION_OUTPUT: &str = "Thought: check\nAction: Echo\nAction_input: @a.sh@\n```\ndf\n```";

    #[test]
    fn test_parse_final_answer_uses_last_marker() {
        let step = parse_output("Thought: done\nFinal Answer: a\nFinal Answer:  b \n").unwrap();
        assert_eq!(step, AgentStep::Finish("b".to_string()));
    }

    #[test]
    fn test_parse_action() {
        match parse_output(ACTION_OUTPUT).unwrap() {
            AgentStep::Action(action) => {
                assert_eq!(action.tool, "Echo");
                assert_eq!(action.input, ACTION_OUTPUT);
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_without_markers_fails() {
        let err = parse_output("I think the disk is full.").unwrap_err();
        assert!(matches!(err, NuwaError::AgentParse(_)));
    }

    #[test]
    fn test_scratchpad_format() {
        let action = AgentAction {
            tool: "Echo".to_string(),
            input: "x".to_string(),
            log: "Action: Echo\nAction_input: x".to_string(),
        };

        assert_eq!(scratchpad(&[]), "");
        assert_eq!(
            scratchpad(&[(action, "ok".to_string())]),
            "Action: Echo\nAction_input: x\nObservation: ok\nThought:"
        );
    }

    #[tokio::test]
    async fn test_runs_tool_then_finishes() {
        let model = ScriptedModel::new(&[ACTION_OUTPUT, "Thought: I now know\nFinal Answer: disk is fine"]);

        let answer = executor(model.clone(), false).run("check disk").await.unwrap();

        assert_eq!(answer, "disk is fine");
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Question: check disk"));
        assert!(prompts[0].contains("- Echo: echoes"));
        assert!(prompts[1].contains("\nObservation: echoed"));
        assert!(prompts[1].trim_end().ends_with("Thought:"));
    }

    #[tokio::test]
    async fn test_invented_observation_is_cut_off() {
        let output = format!("{}\nObservation: made up\nFinal Answer: too early", ACTION_OUTPUT);
        let model = ScriptedModel::new(&[&output, "Final Answer: real"]);

        let answer = executor(model.clone(), false).run("q").await.unwrap();

        assert_eq!(answer, "real");
        assert!(!model.prompts.lock().unwrap()[1].contains("made up"));
    }

    #[tokio::test]
    async fn test_tab_indented_observation_is_cut_off() {
        let output = format!("{}\n\tObservation: made up\nFinal Answer: too early", ACTION_OUTPUT);
        let model = ScriptedModel::new(&[&output, "Final Answer: real"]);

        let answer = executor(model.clone(), false).run("q").await.unwrap();

        assert_eq!(answer, "real");
        assert!(!model.prompts.lock().unwrap()[1].contains("made up"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let model = ScriptedModel::new(&[
            "Action: Hammer\nAction_input: nail",
            "Final Answer: gave up",
        ]);

        executor(model.clone(), false).run("q").await.unwrap();

        assert!(model.prompts.lock().unwrap()[1]
            .contains("Observation: Hammer is not a valid tool, try another one."));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let model = ScriptedModel::new(&[ACTION_OUTPUT, "Final Answer: cleaned up"]);

        let answer = executor(model.clone(), true).run("q").await.unwrap();

        assert_eq!(answer, "cleaned up");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[1].contains("execution failed (exit status: 1)\ndisk full"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let outputs = vec![ACTION_OUTPUT; 3];
        let model = ScriptedModel::new(&outputs);

        let err = executor(model, false).with_max_steps(3).run("q").await.unwrap_err();

        assert!(matches!(err, NuwaError::AgentStepLimit(3)));
    }

    #[tokio::test]
    async fn test_script_executor_tool_runs_block() {
        let home = tempfile::tempdir().unwrap();
        let scripts = Arc::new(
            ScriptMaterializer::new(Some(home.path()), crate::shell::ShellExecutor::system()).unwrap(),
        );
        let tool = ScriptExecutorTool::new(Arc::new(crate::parser::MarkdownBlockParser::new()), scripts);

        let output = tool
            .call("Action: ScriptExecutor\nAction_input: @t.sh@\n```shell\necho agent-ran\n```")
            .await
            .unwrap();

        assert!(output.contains("agent-ran"));
        assert!(tool.call("no script here").await.is_err());
    }
}
