//! Turns recovered file content into an executed, then deleted, script.
//!
//! Scripts live under `$HOME/.nuwa-terminal/scripts/<uuid>.sh`. At most one
//! copy exists per call and it is removed on every exit path.

use crate::error::{NuwaError, Result};
use crate::parser::{ResponseParser, SourceFile};
use crate::shell::ShellExecutor;
use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const NUWA_DIR: &str = ".nuwa-terminal";
pub const SCRIPTS_DIR: &str = "scripts";

const SCRIPT_MODE: u32 = 0o777;

/// Writes scripts to the scripts directory and runs them.
pub struct ScriptMaterializer {
    scripts_dir: PathBuf,
    shell: ShellExecutor,
}

impl ScriptMaterializer {
    /// Creates a materializer rooted at `$HOME/.nuwa-terminal/scripts`.
    ///
    /// # Errors
    ///
    /// [`NuwaError::Config`] if `home` is missing or empty.
    pub fn new(home: Option<&Path>, shell: ShellExecutor) -> Result<Self> {
        let home = home
            .filter(|h| !h.as_os_str().is_empty())
            .ok_or_else(|| NuwaError::Config("HOME is not set".to_string()))?;

        Ok(Self::with_scripts_dir(
            home.join(NUWA_DIR).join(SCRIPTS_DIR),
            shell,
        ))
    }

    pub fn with_scripts_dir(scripts_dir: PathBuf, shell: ShellExecutor) -> Self {
        Self { scripts_dir, shell }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Generates a fresh script name. The `.sh` suffix is always forced.
    pub fn generate_name() -> String {
        format!("{}.sh", uuid::Uuid::new_v4())
    }

    /// Parses `reply` and runs the first source found. Later sources are
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`NuwaError::Parse`] if the reply has no usable block.
    pub fn run_reply(&self, parser: &dyn ResponseParser, reply: &str) -> Result<String> {
        let sources = parser.parse_sources(reply)?;
        let source = sources
            .first()
            .ok_or_else(|| NuwaError::Parse("no source files found".to_string()))?;
        self.run_source(source)
    }

    /// Runs the first source recovered from a reply under a generated name,
    /// ignoring any name the model suggested.
    pub fn run_source(&self, source: &SourceFile) -> Result<String> {
        let mut source = source.clone();
        source.parse_file_content();
        if source.file_content.trim().is_empty() {
            return Err(NuwaError::Parse("empty script".to_string()));
        }
        self.materialize_and_run(&Self::generate_name(), &source.file_content)
    }

    /// Writes `content` to `<scripts_dir>/<file_name>`, runs it with the
    /// shell executor and deletes it again, whether or not it ran cleanly.
    ///
    /// A failed deletion is logged and does not change the result.
    pub fn materialize_and_run(&self, file_name: &str, content: &str) -> Result<String> {
        let script = self.write_script(file_name, content)?;
        let result = self.shell.run_script(script.path());
        script.remove();
        result
    }

    fn write_script(&self, file_name: &str, content: &str) -> Result<ScriptFile> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(SCRIPT_MODE)
            .create(&self.scripts_dir)
            .map_err(|e| NuwaError::io("failed to create script directory", e))?;

        let path = self.scripts_dir.join(file_name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(SCRIPT_MODE)
            .open(&path)
            .map_err(|e| NuwaError::io("failed to create script file", e))?;

        // From here on the guard owns cleanup.
        let script = ScriptFile { path: Some(path) };
        file.write_all(content.as_bytes())
            .map_err(|e| NuwaError::io("failed to write script file", e))?;

        info!("Script file saved to {}", script.path().display());
        Ok(script)
    }
}

/// An on-disk script that is deleted when dropped.
struct ScriptFile {
    path: Option<PathBuf>,
}

impl ScriptFile {
    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    fn remove(mut self) {
        if let Some(path) = self.path.take() {
            Self::remove_path(&path);
        }
    }

    fn remove_path(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => info!("Script file removed: {}", path.display()),
            Err(e) => warn!("Failed to remove script file {}: {}", path.display(), e),
        }
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            Self::remove_path(&path);
        }
    }
}
