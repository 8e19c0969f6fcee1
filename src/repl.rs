//! Interactive line editor around the dispatcher.

use crate::dispatcher::{ControlToken, Dispatcher, Flow};
use crate::error::Result;
use crate::mode::Mode;
use colored::Colorize;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Context, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use std::borrow::Cow::{self, Borrowed, Owned};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Control chords and the mode each one selects.
pub const KEY_BINDINGS: [(char, Mode); 5] = [
    ('T', Mode::Chat),
    ('F', Mode::Command),
    ('S', Mode::Task),
    ('A', Mode::Agent),
    ('B', Mode::Bash),
];

/// Completion, hints and hint styling for the prompt.
pub struct NuwaHelper {
    tokens: Vec<String>,
    history: Vec<String>,
    files: FilenameCompleter,
}

impl NuwaHelper {
    pub fn new() -> Self {
        Self {
            tokens: ControlToken::KEYWORDS.iter().map(|t| t.to_string()).collect(),
            history: Vec::new(),
            files: FilenameCompleter::new(),
        }
    }

    /// Remembers an entered line as a completion candidate.
    pub fn remember(&mut self, line: &str) {
        if !line.is_empty() && !self.history.iter().any(|h| h == line) {
            self.history.push(line.to_string());
        }
    }

    /// Control tokens first, then past inputs, that extend `prefix`.
    pub fn candidates(&self, prefix: &str) -> Vec<String> {
        if prefix.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<String> = Vec::new();
        for candidate in self.tokens.iter().chain(self.history.iter().rev()) {
            if candidate.starts_with(prefix) && candidate != prefix && !out.contains(candidate) {
                out.push(candidate.clone());
            }
        }
        out
    }
}

impl Default for NuwaHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Helper for NuwaHelper {}

impl Completer for NuwaHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let before = &line[..pos];

        if before.starts_with("./") || before.starts_with('/') {
            return self.files.complete(line, pos, ctx);
        }

        let pairs = self
            .candidates(before)
            .into_iter()
            .map(|c| Pair {
                display: c.clone(),
                replacement: c,
            })
            .collect();
        Ok((0, pairs))
    }
}

impl Hinter for NuwaHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() || line.contains(' ') {
            return None;
        }

        self.tokens
            .iter()
            .find(|t| !line.is_empty() && t.starts_with(line) && t.len() > line.len())
            .map(|t| t[line.len()..].to_string())
    }
}

impl Highlighter for NuwaHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if hint.is_empty() {
            Borrowed(hint)
        } else {
            Owned(hint.dimmed().to_string())
        }
    }
}

impl Validator for NuwaHelper {}

/// Records the chosen mode and interrupts the current line.
struct ModeSwitchKey {
    mode: Mode,
    pending: Arc<Mutex<Option<Mode>>>,
}

impl ConditionalEventHandler for ModeSwitchKey {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        _ctx: &EventContext,
    ) -> Option<Cmd> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.mode);
        Some(Cmd::Interrupt)
    }
}

/// Runs the interactive loop until `exit`, Ctrl-D or a terminal error.
///
/// Ctrl-C clears the current line. The mode chords also interrupt the line;
/// a pending mode tells the two apart.
pub async fn run<W: Write>(dispatcher: &mut Dispatcher<W>) -> Result<()> {
    let pending: Arc<Mutex<Option<Mode>>> = Arc::new(Mutex::new(None));

    let mut editor: Editor<NuwaHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(NuwaHelper::new()));
    for (key, mode) in KEY_BINDINGS {
        editor.bind_sequence(
            KeyEvent::ctrl(key),
            EventHandler::Conditional(Box::new(ModeSwitchKey {
                mode,
                pending: pending.clone(),
            })),
        );
    }

    println!(
        "{}",
        "Welcome to NUWA terminal. Type exit or press Ctrl-D to leave.".bright_cyan()
    );
    println!(
        "{}",
        "Modes: chatmode, cmdmode, taskmode, agentmode, bashmode (Ctrl-T/F/S/A/B)".dimmed()
    );

    loop {
        let prompt = match dispatcher.modes().live_prefix() {
            (prefix, true) => prefix.to_string(),
            (_, false) => "> ".to_string(),
        };

        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    editor.add_history_entry(line)?;
                    if let Some(helper) = editor.helper_mut() {
                        helper.remember(line);
                    }
                }

                if dispatcher.handle(line).await == Flow::Exit {
                    info!("Exit requested");
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                let mode = pending.lock().unwrap_or_else(|e| e.into_inner()).take();
                match mode {
                    Some(mode) => {
                        dispatcher.switch_mode(mode);
                        println!("{}", format!("Switched to {}", mode).yellow());
                    }
                    None => debug!("Line cancelled"),
                }
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Bye.".bright_green());
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
