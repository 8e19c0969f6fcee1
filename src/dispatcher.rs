//! Turns one line of user input into at most one model call and one
//! execution, according to the current mode.

use crate::agent::{Agent, AgentExecutor, ScriptExecutorTool, Tool};
use crate::chat::ChatSession;
use crate::command_extractor::extract_command;
use crate::error::{NuwaError, Result};
use crate::mode::{Mode, ModeManager};
use crate::model::Model;
use crate::nuwa_script::{self, NuwaScript};
use crate::parser::{MarkdownBlockParser, ResponseParser};
use crate::providers::{SystemTimeProvider, TimeProvider};
use crate::script::ScriptMaterializer;
use crate::shell::{ShellExecutor, builtin_cd};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Input that is handled locally instead of being sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    Exit,
    SwitchMode(Mode),
    ResetChat,
    Script(PathBuf),
}

impl ControlToken {
    pub const KEYWORDS: [&'static str; 7] = [
        "exit",
        "chatmode",
        "cmdmode",
        "taskmode",
        "agentmode",
        "bashmode",
        "resetchat",
    ];

    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        match input {
            "exit" => Some(Self::Exit),
            "resetchat" => Some(Self::ResetChat),
            _ => {
                if let Some(mode) = Mode::ALL.into_iter().find(|m| m.keyword() == input) {
                    return Some(Self::SwitchMode(mode));
                }
                nuwa_script::script_path(input).map(|p| Self::Script(PathBuf::from(p)))
            }
        }
    }
}

/// What the caller should do after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Routes input by mode and owns the per-session state.
///
/// The chat session is built once and lives as long as the dispatcher. Agent
/// executors are built fresh for every agent turn.
pub struct Dispatcher<W: Write> {
    modes: ModeManager,
    model: Arc<dyn Model>,
    chat: ChatSession,
    parser: Arc<dyn ResponseParser>,
    shell: ShellExecutor,
    scripts: Arc<ScriptMaterializer>,
    time: Arc<dyn TimeProvider>,
    home: Option<PathBuf>,
    color: bool,
    out: W,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(
        modes: ModeManager,
        model: Arc<dyn Model>,
        shell: ShellExecutor,
        scripts: ScriptMaterializer,
        out: W,
    ) -> Self {
        let chat = ChatSession::new(model.clone(), Mode::Chat.system_prompt().unwrap_or_default());
        Self {
            modes,
            model,
            chat,
            parser: Arc::new(MarkdownBlockParser::new()),
            shell,
            scripts: Arc::new(scripts),
            time: Arc::new(SystemTimeProvider),
            home: None,
            color: false,
            out,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }

    /// Directory used by `cd` with no argument or a leading `~`.
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn modes(&self) -> &ModeManager {
        &self.modes
    }

    pub fn chat_session(&self) -> &ChatSession {
        &self.chat
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        self.modes.switch_mode(mode);
    }

    /// Processes one input and never fails: errors are logged with the mode
    /// they happened in, and any output a failed execution produced is still
    /// shown.
    pub async fn handle(&mut self, input: &str) -> Flow {
        self.try_handle(input).await.unwrap_or(Flow::Continue)
    }

    /// Like [`handle`](Self::handle), but hands the error back after
    /// reporting it.
    pub async fn try_handle(&mut self, input: &str) -> Result<Flow> {
        let mode = self.modes.current_mode();
        let result = self.dispatch(input).await;
        if let Err(e) = &result {
            match e {
                NuwaError::NoMatch | NuwaError::Parse(_) => {
                    warn!(mode = %mode, error = %e, "nothing to execute")
                }
                _ => error!(mode = %mode, error = %e, "turn failed"),
            }
            if let Some(output) = e.output() {
                let _ = self.emit_output(output);
            }
        }
        result
    }

    /// Processes one input, returning the first error.
    pub async fn dispatch(&mut self, input: &str) -> Result<Flow> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Flow::Continue);
        }

        if let Some(token) = ControlToken::parse(input) {
            debug!("Control token: {:?}", token);
            match token {
                ControlToken::Exit => return Ok(Flow::Exit),
                ControlToken::SwitchMode(mode) => self.switch_mode(mode),
                ControlToken::ResetChat => self.chat.reset(),
                ControlToken::Script(path) => self.run_nuwa_script(&path).await?,
            }
            return Ok(Flow::Continue);
        }

        match self.modes.current_mode() {
            Mode::Chat => self.chat_turn(input).await?,
            Mode::Command => self.command_turn(input).await?,
            Mode::Task => self.task_turn(input).await?,
            Mode::Agent => self.agent_turn(input).await?,
            Mode::Bash => self.run_shell(input)?,
        }
        Ok(Flow::Continue)
    }

    async fn chat_turn(&mut self, input: &str) -> Result<()> {
        let reply = self.chat.chat(input).await?;
        self.emit_reply(&reply)
    }

    async fn command_turn(&mut self, input: &str) -> Result<()> {
        let reply = self.generate(input).await?;
        self.emit_reply(&reply)?;

        let command = extract_command(&reply)?;
        if command.trim().is_empty() {
            info!("Empty command, nothing to execute");
            return Ok(());
        }
        self.run_shell(&command)
    }

    async fn task_turn(&mut self, input: &str) -> Result<()> {
        let reply = self.generate(input).await?;
        self.emit_reply(&reply)?;
        self.run_script_reply(&reply)
    }

    async fn agent_turn(&mut self, input: &str) -> Result<()> {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(ScriptExecutorTool::new(
            self.parser.clone(),
            self.scripts.clone(),
        ))];
        let agent = Agent::new(self.model.clone(), tools, self.time.clone());

        let answer = AgentExecutor::new(agent).run(input).await?;
        self.emit_reply(&answer)
    }

    async fn run_nuwa_script(&mut self, path: &Path) -> Result<()> {
        let script = NuwaScript::load(path)?;
        info!("Running nuwa script {}", script.path().display());

        let reply = self.model.generate(&script.prompt()).await?;
        self.emit_reply(&reply)?;
        self.run_script_reply(&reply)
    }

    /// Single-shot generation with the current mode's system prompt.
    async fn generate(&self, input: &str) -> Result<String> {
        let prompt = match self.modes.system_prompt() {
            Some(system) => format!("{}\n{}", system, input),
            None => input.to_string(),
        };
        debug!("Sending prompt to {}", self.model.name());
        self.model.generate(&prompt).await
    }

    fn run_script_reply(&mut self, reply: &str) -> Result<()> {
        let output = self.scripts.run_reply(self.parser.as_ref(), reply)?;
        self.emit_output(&output)
    }

    /// Runs `command`, handling a bare `cd` in-process, then reconciles the
    /// live prefix with the working directory.
    fn run_shell(&mut self, command: &str) -> Result<()> {
        let result = match builtin_cd(command) {
            Some(target) => self.change_dir(target),
            None => self
                .shell
                .run_command(command)
                .and_then(|output| self.emit_output(&output)),
        };

        if self.modes.check_directory_changed() {
            info!("Now in {}", self.modes.current_dir().display());
        }
        result
    }

    fn change_dir(&self, target: Option<&str>) -> Result<()> {
        let home = || {
            self.home
                .clone()
                .ok_or_else(|| NuwaError::Config("HOME is not set".to_string()))
        };

        let path = match target {
            None | Some("~") => home()?,
            Some(dir) => match dir.strip_prefix("~/") {
                Some(rest) => home()?.join(rest),
                None => PathBuf::from(dir),
            },
        };
        self.modes.change_dir(&path)
    }

    fn emit_reply(&mut self, reply: &str) -> Result<()> {
        let label = if self.color {
            "NUWA:".green().bold().to_string()
        } else {
            "NUWA:".to_string()
        };
        writeln!(self.out, "{} {}", label, reply.trim_end())
            .map_err(|e| NuwaError::io("failed to write reply", e))
    }

    fn emit_output(&mut self, output: &str) -> Result<()> {
        let result = if output.ends_with('\n') || output.is_empty() {
            write!(self.out, "{}", output)
        } else {
            writeln!(self.out, "{}", output)
        };
        result
            .and_then(|_| self.out.flush())
            .map_err(|e| NuwaError::io("failed to write output", e))
    }
}
