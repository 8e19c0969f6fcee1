//! NUWA terminal - an LLM-assisted shell.
//!
//! Every line typed at the prompt is routed by the current [`mode::Mode`]:
//!
//! - **Chat** keeps a multi-turn conversation with the model
//! - **Command** asks the model for one shell command and runs it
//! - **Task** asks the model for a shell script, runs it and deletes it
//! - **Agent** runs a plan/act/observe loop whose only tool runs scripts
//! - **Bash** runs the input directly, without the model
//!
//! Files ending in `.nw` whose first line is `#!/bin/nuwa` hold natural
//! language instructions; they are translated into a shell script by the
//! model and run like a Task-mode reply.
//!
//! # Architecture
//!
//! - [`dispatcher`] - Routes one input line according to the mode
//! - [`mode`] - Modes, working-directory tracking and the live prompt prefix
//! - [`parser`] - Recovers `@name@` + fenced code blocks from replies
//! - [`command_extractor`] - Recovers `execute command: ` lines
//! - [`script`] - Writes, runs and removes generated scripts
//! - [`shell`] - Runs commands with `sh -c` and scripts with `bash -x`
//! - [`agent`] - The agent loop and its tools
//! - [`nuwa_script`] - Loading and validating `.nw` scripts
//! - [`model`], [`chat`], [`backends`] - LLM providers and chat sessions
//! - [`prompts`] - System prompts for each mode
//! - [`config`] - Configuration file and environment variables
//! - [`repl`] - The interactive line editor
//! - [`providers`], [`http_client`] - Dependency injection seams
//!
//! # Example
//!
//! ```ignore
//! use nuwa_terminal::backends::ModelRegistry;
//! use nuwa_terminal::config::Config;
//! use nuwa_terminal::dispatcher::Dispatcher;
//! use nuwa_terminal::mode::{Mode, ModeManager};
//! use nuwa_terminal::providers::SystemDirProvider;
//! use nuwa_terminal::script::ScriptMaterializer;
//! use nuwa_terminal::shell::ShellExecutor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let model = ModelRegistry::with_defaults().build(&config)?;
//!     let modes = ModeManager::new(Arc::new(SystemDirProvider), Mode::Command)?;
//!     let shell = ShellExecutor::system();
//!     let scripts = ScriptMaterializer::new(config.home.as_deref(), shell.clone())?;
//!
//!     let mut dispatcher = Dispatcher::new(modes, model, shell, scripts, std::io::stdout());
//!     dispatcher.handle("show disk usage of the current directory").await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod backends;
pub mod chat;
pub mod command_extractor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http_client;
pub mod mode;
pub mod model;
pub mod nuwa_script;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod repl;
pub mod script;
pub mod shell;
