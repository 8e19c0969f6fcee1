//! `.nw` scripts: natural-language job descriptions run like shell scripts.
//!
//! ```text
//! #!/bin/nuwa
//! find the five largest files under /var/log
//! compress them into /tmp/logs.tar.gz
//! ```
//!
//! The instruction lines are handed to the model, which translates them into
//! a shell script that then goes through the normal script pipeline.

use crate::error::{NuwaError, Result};
use crate::prompts;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SHEBANG: &str = "#!/bin/nuwa";
pub const EXTENSION: &str = ".nw";

/// Returns the script path if `input` is a single `.nw` path, with or without
/// a leading `nw `.
///
/// Command lines that merely mention a `.nw` file (`chmod +x job.nw`) are not
/// script paths.
pub fn script_path(input: &str) -> Option<&str> {
    let input = input.trim();
    let path = input.strip_prefix("nw ").map(str::trim).unwrap_or(input);
    let is_path = !path.contains(char::is_whitespace)
        && path.len() > EXTENSION.len()
        && path.ends_with(EXTENSION);
    is_path.then_some(path)
}

/// A validated nuwa script.
#[derive(Debug, Clone)]
pub struct NuwaScript {
    path: PathBuf,
    instruction: String,
}

impl NuwaScript {
    /// Loads and validates the script at `path`.
    ///
    /// # Errors
    ///
    /// [`NuwaError::InvalidScript`] if the file is missing, not executable,
    /// lacks the `#!/bin/nuwa` first line or has no instruction.
    /// [`NuwaError::Io`] if it cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: String| NuwaError::InvalidScript {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
        if !metadata.is_file() {
            return Err(invalid("not a file".to_string()));
        }
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(invalid("not executable".to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| NuwaError::io(format!("failed to read {}", path.display()), e))?;

        let (first, rest) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        if first.trim_end_matches('\r') != SHEBANG {
            return Err(invalid(format!("first line must be {}", SHEBANG)));
        }

        let instruction = rest.trim();
        if instruction.is_empty() {
            return Err(invalid("no instruction after the first line".to_string()));
        }

        info!("Loaded nuwa script {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            instruction: instruction.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// The transcription prompt followed by the instruction.
    pub fn prompt(&self) -> String {
        format!("{}\n{}", prompts::script_mode_prompt(), self.instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_script(dir: &Path, name: &str, content: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_script_path_detection() {
        assert_eq!(script_path("job.nw"), Some("job.nw"));
        assert_eq!(script_path("nw ./jobs/clean.nw"), Some("./jobs/clean.nw"));
        assert_eq!(script_path("  /tmp/a.nw  "), Some("/tmp/a.nw"));
        assert_eq!(script_path(".nw"), None);
        assert_eq!(script_path("ls -la"), None);
        assert_eq!(script_path("cat notes.nwx"), None);
        assert_eq!(script_path("chmod +x job.nw"), None);
        assert_eq!(script_path("nw cat job.nw"), None);
    }

    #[test]
    fn test_load_valid_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "list.nw", "#!/bin/nuwa\nlist files\n", 0o755);

        let script = NuwaScript::load(&path).unwrap();

        assert_eq!(script.instruction(), "list files");
        assert_eq!(script.path(), path);
        let prompt = script.prompt();
        assert!(prompt.starts_with(&prompts::script_mode_prompt()));
        assert!(prompt.ends_with("\nlist files"));
    }

    #[test]
    fn test_crlf_shebang_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "dos.nw", "#!/bin/nuwa\r\nshow disk usage\r\n", 0o700);

        assert_eq!(NuwaScript::load(&path).unwrap().instruction(), "show disk usage");
    }

    #[test]
    fn test_misspelled_shebang_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "bad.nw", "#!/bin/nuwaa\nlist files\n", 0o755);

        let err = NuwaScript::load(&path).unwrap_err();

        assert!(matches!(err, NuwaError::InvalidScript { .. }));
        assert!(err.to_string().contains("#!/bin/nuwa"));
    }

    #[test]
    fn test_non_executable_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "plain.nw", "#!/bin/nuwa\nlist files\n", 0o644);

        let err = NuwaScript::load(&path).unwrap_err();

        assert!(err.to_string().contains("not executable"));
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let err = NuwaScript::load(Path::new("/nonexistent/job.nw")).unwrap_err();
        assert!(matches!(err, NuwaError::InvalidScript { .. }));
    }

    #[test]
    fn test_empty_instruction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "empty.nw", "#!/bin/nuwa\n\n  \n", 0o755);

        assert!(NuwaScript::load(&path).is_err());
    }
}
