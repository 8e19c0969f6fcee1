//! Recovers source files from free-text model replies.
//!
//! The model is asked to represent every file as a `@name@` marker line
//! followed by a fenced code block:
//!
//! ````text
//! @query_files.sh@
//! ```shell
//! #!/bin/bash
//! ls -l
//! ```
//! ````
//!
//! Parsing is a best-effort grammar over that convention. It sits behind the
//! [`ResponseParser`] trait so a stricter structured-output contract can
//! replace it without touching callers.

use crate::error::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static MARKED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@[a-zA-Z0-9_/.]+@\n```[^\n]*\n(?s:.*?)\n```").expect("valid regex")
});

static BARE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[^\n]*\n(?s:.*?)\n```").expect("valid regex"));

static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([a-zA-Z0-9_./]+)@").expect("valid regex"));

static FILE_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[^\n]*\n((?s:.*?))\n```").expect("valid regex"));

/// One file recovered from a model reply.
///
/// `file_name` and `file_content` are extracted lazily from `match_content`
/// by [`parse_file_name`](Self::parse_file_name) and
/// [`parse_file_content`](Self::parse_file_content).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub file_name: String,
    pub file_content: String,
    /// The whole matched span, marker line and fences included.
    pub match_content: String,
}

impl SourceFile {
    pub fn from_match(match_content: &str) -> Self {
        Self {
            match_content: match_content.to_string(),
            ..Self::default()
        }
    }

    /// Fills `file_name` from the `@name@` marker. Leaves it untouched when
    /// there is no marker.
    pub fn parse_file_name(&mut self) -> &mut Self {
        match FILE_NAME.captures(&self.match_content) {
            Some(caps) => {
                self.file_name = caps[1].to_string();
                debug!("Parsed file name: {}", self.file_name);
            }
            None => debug!("No file name marker in match"),
        }
        self
    }

    /// Fills `file_content` with the fenced body, fence lines excluded.
    pub fn parse_file_content(&mut self) -> &mut Self {
        match FILE_CONTENT.captures(&self.match_content) {
            Some(caps) => self.file_content = caps[1].to_string(),
            None => debug!("No fenced block in match"),
        }
        self
    }
}

/// Extracts candidate source files from a model reply.
pub trait ResponseParser: Send + Sync {
    /// Returns every match in order. An empty list is the normal "nothing
    /// found" outcome, not an error.
    fn parse_sources(&self, text: &str) -> Result<Vec<SourceFile>>;
}

/// Parser for the `@name@` + fenced block convention.
///
/// When a reply has no marked block at all, bare fenced blocks are accepted
/// as a fallback; their `file_name` stays empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownBlockParser;

impl MarkdownBlockParser {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseParser for MarkdownBlockParser {
    fn parse_sources(&self, text: &str) -> Result<Vec<SourceFile>> {
        let mut sources: Vec<SourceFile> = MARKED_BLOCK
            .find_iter(text)
            .map(|m| SourceFile::from_match(m.as_str()))
            .collect();

        if sources.is_empty() {
            sources = BARE_BLOCK
                .find_iter(text)
                .map(|m| SourceFile::from_match(m.as_str()))
                .collect();
        }

        info!("Found {} source block(s) in model reply", sources.len());
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<SourceFile> {
        MarkdownBlockParser::new().parse_sources(text).unwrap()
    }

    #[test]
    fn test_marked_block_yields_one_source() {
        let reply = "Here you go:\n@query_files.sh@\n``` shell\n#!/bin/bash\nls -l\n```\n\nDone.";

        let mut sources = parse(reply);

        assert_eq!(sources.len(), 1);
        sources[0].parse_file_name().parse_file_content();
        assert_eq!(sources[0].file_name, "query_files.sh");
        assert_eq!(sources[0].file_content, "#!/bin/bash\nls -l");
        assert!(sources[0].match_content.starts_with("@query_files.sh@"));
        assert!(sources[0].match_content.ends_with("```"));
    }

    #[test]
    fn test_content_keeps_internal_blank_lines() {
        let reply = "@job.sh@\n```bash\necho one\n\n\necho two\n```";

        let mut sources = parse(reply);
        sources[0].parse_file_content();

        assert_eq!(sources[0].file_content, "echo one\n\n\necho two");
    }

    #[test]
    fn test_no_fenced_block_returns_empty_list() {
        assert!(parse("I am sorry, I'm in taskmode, I can't understand your input.").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("@orphan.sh@\nno fence here").is_empty());
    }

    #[test]
    fn test_multiple_blocks_are_returned_in_order() {
        let reply = "@a.sh@\n```\necho a\n```\ntext\n@b.sh@\n```\necho b\n```";

        let mut sources = parse(reply);

        assert_eq!(sources.len(), 2);
        sources[0].parse_file_name();
        sources[1].parse_file_name();
        assert_eq!(sources[0].file_name, "a.sh");
        assert_eq!(sources[1].file_name, "b.sh");
    }

    #[test]
    fn test_bare_fenced_block_is_fallback() {
        let reply = "Try this:\n```sh\ndf -h\n```";

        let mut sources = parse(reply);

        assert_eq!(sources.len(), 1);
        sources[0].parse_file_name().parse_file_content();
        assert!(sources[0].file_name.is_empty());
        assert_eq!(sources[0].file_content, "df -h");
    }

    #[test]
    fn test_marked_blocks_take_precedence_over_bare_ones() {
        let reply = "```\nnot this\n```\n@real.sh@\n```\necho real\n```";

        let mut sources = parse(reply);

        assert_eq!(sources.len(), 1);
        sources[0].parse_file_content();
        assert_eq!(sources[0].file_content, "echo real");
    }

    #[test]
    fn test_nested_path_in_marker() {
        let mut source = SourceFile::from_match("@cmd/hello_world.go@\n```\npackage main\n```");

        source.parse_file_name();

        assert_eq!(source.file_name, "cmd/hello_world.go");
    }
}
