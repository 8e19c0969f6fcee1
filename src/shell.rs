//! Shell execution for commands and generated scripts.
//!
//! Commands run through `sh -c` so pipes, redirection and other shell syntax
//! in model-authored text are honored. Scripts run through `bash -x` so every
//! executed line is traced into the captured output next to its result.
//!
//! Both block until the subprocess exits. There is no timeout.

use crate::error::{NuwaError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use tracing::{error, info};

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Trait for running system processes.
///
/// This abstraction enables testing without spawning real processes.
pub trait ProcessRunner: Send + Sync {
    /// Executes a program and waits for its output.
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output>;

    /// Checks if a program exists in PATH.
    fn program_exists(&self, program: &str) -> bool;
}

/// Default process runner using std::process::Command.
///
/// The child's stdout and stderr share one pipe, so the captured bytes keep
/// the order they were written in. Everything lands in `Output::stdout`.
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output> {
        let (mut reader, writer) = std::io::pipe()?;

        let mut cmd = Command::new(program);
        cmd.args(args).stdout(writer.try_clone()?).stderr(writer);
        let mut child = cmd.spawn()?;
        // The command still holds both write ends; EOF only arrives once
        // they are closed.
        drop(cmd);

        let mut combined = Vec::new();
        reader.read_to_end(&mut combined)?;
        let status = child.wait()?;

        Ok(Output {
            status,
            stdout: combined,
            stderr: Vec::new(),
        })
    }

    fn program_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

const COMMAND_SHELL: &str = "sh";
const SCRIPT_SHELL: &str = "bash";

// =============================================================================
// Executor Implementation
// =============================================================================

/// Runs command strings and script files, returning combined output.
///
/// # Example
///
/// ```ignore
/// let shell = ShellExecutor::system();
/// let output = shell.run_command("echo hi | tr a-z A-Z")?;
/// assert_eq!(output.trim(), "HI");
/// ```
#[derive(Clone)]
pub struct ShellExecutor {
    runner: Arc<dyn ProcessRunner>,
}

impl ShellExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Executor backed by real subprocesses.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemProcessRunner))
    }

    /// Runs `command` as `sh -c <command>`.
    ///
    /// # Errors
    ///
    /// [`NuwaError::Execution`] on spawn failure or unsuccessful exit, with
    /// whatever output was captured.
    pub fn run_command(&self, command: &str) -> Result<String> {
        info!("Executing command: {}", command);
        let output = self.runner.run(COMMAND_SHELL, &["-c", command]);
        Self::handle_output(output)
    }

    /// Runs the script at `path` as `bash -x <path>`.
    pub fn run_script(&self, path: &Path) -> Result<String> {
        if !self.runner.program_exists(SCRIPT_SHELL) {
            return Err(NuwaError::Execution {
                status: format!("{} is not installed", SCRIPT_SHELL),
                output: String::new(),
            });
        }

        let path = path.to_string_lossy();
        info!("Executing script: {}", path);
        let output = self.runner.run(SCRIPT_SHELL, &["-x", &path]);
        Self::handle_output(output)
    }

    /// Folds a finished process into its combined output or an execution
    /// error carrying that output. Runners that capture the streams apart
    /// get stdout followed by stderr.
    fn handle_output(output: std::io::Result<Output>) -> Result<String> {
        let output = output.map_err(|e| NuwaError::Execution {
            status: format!("failed to spawn: {}", e),
            output: String::new(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            error!("Command failed with status: {}", output.status);
            Err(NuwaError::Execution {
                status: output.status.to_string(),
                output: combined,
            })
        }
    }
}

/// Recognizes a bare `cd [dir]` that must run in-process.
///
/// Returns `Some(None)` for `cd` alone and `Some(Some(dir))` for `cd dir`.
/// Anything with shell operators, or with more than one argument, is left to
/// the shell.
pub fn builtin_cd(command: &str) -> Option<Option<&str>> {
    let command = command.trim();
    let rest = match command.strip_prefix("cd") {
        Some("") => return Some(None),
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => return None,
    };

    if rest.contains([';', '&', '|', '<', '>', '`', '$', '(', ')'])
        || rest.split_whitespace().count() > 1
    {
        return None;
    }

    // `cd -`, options and `~user` need the shell's own bookkeeping.
    let tilde_user = rest.starts_with('~') && rest != "~" && !rest.starts_with("~/");
    if rest.starts_with('-') || tilde_user {
        return None;
    }

    Some(Some(rest).filter(|dir| !dir.is_empty()))
}
