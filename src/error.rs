//! Error taxonomy shared by every stage of the dispatch pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning user input into model calls and executions.
///
/// None of these are fatal once the interactive loop is running: the
/// dispatcher logs them and moves on to the next input.
#[derive(Debug, Error)]
pub enum NuwaError {
    /// Missing or invalid configuration (environment, backend selection).
    #[error("configuration error: {0}")]
    Config(String),

    /// The model reply did not contain the expected delimited block.
    #[error("parse error: {0}")]
    Parse(String),

    /// No `execute command: ` line in the model reply.
    #[error("no match found")]
    NoMatch,

    #[error("unknown mode: {0}")]
    UnknownMode(String),

    /// A subprocess exited unsuccessfully or could not be spawned.
    #[error("execution failed ({status})")]
    Execution { status: String, output: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The agent reply had neither an action nor a final answer.
    #[error("unable to parse agent output: {0}")]
    AgentParse(String),

    #[error("agent did not reach a final answer within {0} steps")]
    AgentStepLimit(usize),

    /// A `.nw` file that cannot be used as a nuwa script.
    #[error("invalid nuwa script {}: {reason}", path.display())]
    InvalidScript { path: PathBuf, reason: String },

    /// The backend answered, but not with anything usable.
    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("terminal error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

impl NuwaError {
    /// Wraps an I/O error with the step that produced it.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Captured output attached to an execution failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Execution { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NuwaError>;
