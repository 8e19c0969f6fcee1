//! Pulls a single shell command out of a command-mode reply.
//!
//! Command mode instructs the model to answer with exactly
//! `execute command: <command>`; anything else is a refusal or chatter.

use crate::error::{NuwaError, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Literal prefix the command-mode prompt asks the model to emit.
pub const COMMAND_MARKER: &str = "execute command: ";

static COMMAND_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"execute command: (.*)").expect("valid regex"));

/// Returns the text following the first `execute command: ` up to the end of
/// that line.
///
/// An empty command is returned as `Ok("")`; callers treat it as "nothing to
/// do".
///
/// # Errors
///
/// [`NuwaError::NoMatch`] if the marker appears nowhere in `text`.
pub fn extract_command(text: &str) -> Result<String> {
    match COMMAND_LINE.captures(text) {
        Some(caps) => {
            let command = caps[1].trim_end().to_string();
            info!("Extracted command: {}", command);
            Ok(command)
        }
        None => {
            debug!("No '{}' marker in reply", COMMAND_MARKER.trim_end());
            Err(NuwaError::NoMatch)
        }
    }
}
