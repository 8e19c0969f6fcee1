//! Interaction modes and the session state that tracks them.

use crate::error::{NuwaError, Result};
use crate::prompts;
use crate::providers::DirProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// How input is turned into model prompts and how replies are acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Multi-turn conversation; replies are printed.
    #[default]
    Chat,
    /// The reply names one shell command, which is run.
    Command,
    /// The reply carries a shell script, which is run.
    Task,
    /// Plan/act/observe loop with a script-running tool.
    Agent,
    /// Input is run by the shell directly, without the model.
    Bash,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Chat, Mode::Command, Mode::Task, Mode::Agent, Mode::Bash];

    /// Single character shown after the directory in the live prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Mode::Chat => "@",
            Mode::Command => "#",
            Mode::Task => "$",
            Mode::Agent => "&",
            Mode::Bash => ">",
        }
    }

    /// Control token that switches to this mode.
    pub fn keyword(self) -> &'static str {
        match self {
            Mode::Chat => "chatmode",
            Mode::Command => "cmdmode",
            Mode::Task => "taskmode",
            Mode::Agent => "agentmode",
            Mode::Bash => "bashmode",
        }
    }

    /// System prompt sent ahead of input. Agent builds its own per step and
    /// Bash never talks to the model.
    pub fn system_prompt(self) -> Option<String> {
        match self {
            Mode::Chat => Some(prompts::chat_mode_prompt()),
            Mode::Command => Some(prompts::cmd_mode_prompt()),
            Mode::Task => Some(prompts::task_mode_prompt()),
            Mode::Agent | Mode::Bash => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Chat => "ChatMode",
            Mode::Command => "CmdMode",
            Mode::Task => "TaskMode",
            Mode::Agent => "AgentMode",
            Mode::Bash => "BashMode",
        };
        f.write_str(name)
    }
}

impl FromStr for Mode {
    type Err = NuwaError;

    /// Accepts the control keywords, case-insensitively. Anything else is
    /// rejected rather than defaulted.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|m| m.keyword() == name)
            .ok_or_else(|| NuwaError::UnknownMode(s.to_string()))
    }
}

/// Current mode, cached working directory and the live prompt prefix.
///
/// The prefix is always `<dir><mode prefix> ` and is recomputed whenever the
/// mode or the cached directory changes.
pub struct ModeManager {
    dirs: Arc<dyn DirProvider>,
    mode: Mode,
    current_dir: PathBuf,
    live_prefix: String,
    live_prefix_enabled: bool,
}

impl ModeManager {
    /// # Errors
    ///
    /// [`NuwaError::Io`] if the working directory cannot be read. This is the
    /// one startup failure that stops the program.
    pub fn new(dirs: Arc<dyn DirProvider>, mode: Mode) -> Result<Self> {
        let current_dir = dirs
            .current_dir()
            .map_err(|e| NuwaError::io("failed to read working directory", e))?;

        let mut manager = Self {
            dirs,
            mode,
            current_dir,
            live_prefix: String::new(),
            live_prefix_enabled: true,
        };
        manager.refresh_prefix();
        Ok(manager)
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        match self.dirs.current_dir() {
            Ok(dir) => self.current_dir = dir,
            Err(e) => warn!(
                "Failed to read working directory, keeping {}: {}",
                self.current_dir.display(),
                e
            ),
        }

        self.mode = mode;
        self.refresh_prefix();
        info!("Switched to {}", mode);
    }

    /// Switches by control keyword.
    ///
    /// # Errors
    ///
    /// [`NuwaError::UnknownMode`] if `name` is not a mode keyword; the
    /// current mode is left unchanged.
    pub fn switch_mode_by_name(&mut self, name: &str) -> Result<Mode> {
        let mode = name.parse()?;
        self.switch_mode(mode);
        Ok(mode)
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.mode.system_prompt()
    }

    /// Re-reads the working directory and reports whether it moved since the
    /// last look. On a move the cache and live prefix are updated.
    pub fn check_directory_changed(&mut self) -> bool {
        let dir = match self.dirs.current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Failed to read working directory: {}", e);
                return false;
            }
        };

        if dir == self.current_dir {
            return false;
        }

        info!("Working directory changed to {}", dir.display());
        self.current_dir = dir;
        self.refresh_prefix();
        true
    }

    /// The live prefix and whether it should be shown.
    pub fn live_prefix(&self) -> (&str, bool) {
        (&self.live_prefix, self.live_prefix_enabled)
    }

    pub fn current_mode(&self) -> Mode {
        self.mode
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Changes the working directory through the same provider the manager
    /// reads from.
    pub fn change_dir(&self, path: &Path) -> Result<()> {
        self.dirs
            .set_current_dir(path)
            .map_err(|e| NuwaError::io(format!("cd: {}", path.display()), e))
    }

    fn refresh_prefix(&mut self) {
        self.live_prefix = format!("{}{} ", self.current_dir.display(), self.mode.prefix());
        self.live_prefix_enabled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FixedDirProvider;
    use std::io;

    fn manager(dir: &Path) -> (ModeManager, Arc<FixedDirProvider>) {
        let dirs = Arc::new(FixedDirProvider::new(dir));
        (ModeManager::new(dirs.clone(), Mode::Chat).unwrap(), dirs)
    }

    struct BrokenDir;

    impl DirProvider for BrokenDir {
        fn current_dir(&self) -> io::Result<PathBuf> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        }

        fn set_current_dir(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_keywords_parse_to_modes() {
        assert_eq!("chatmode".parse::<Mode>().unwrap(), Mode::Chat);
        assert_eq!("cmdmode".parse::<Mode>().unwrap(), Mode::Command);
        assert_eq!("TaskMode".parse::<Mode>().unwrap(), Mode::Task);
        assert_eq!("agentmode".parse::<Mode>().unwrap(), Mode::Agent);
        assert_eq!(" bashmode ".parse::<Mode>().unwrap(), Mode::Bash);
        assert!(matches!("shellmode".parse::<Mode>(), Err(NuwaError::UnknownMode(_))));
    }

    #[test]
    fn test_initial_prefix() {
        let (manager, _) = manager(Path::new("/srv"));

        assert_eq!(manager.current_mode(), Mode::Chat);
        assert_eq!(manager.live_prefix(), ("/srv@ ", true));
    }

    #[test]
    fn test_switch_is_idempotent() {
        let (mut manager, _) = manager(Path::new("/srv"));

        manager.switch_mode(Mode::Task);
        let once = manager.live_prefix().0.to_string();
        manager.switch_mode(Mode::Task);

        assert_eq!(manager.live_prefix().0, once);
        assert_eq!(once, "/srv$ ");
    }

    #[test]
    fn test_switching_through_all_modes_round_trips() {
        let (mut manager, _) = manager(Path::new("/srv"));
        let original = manager.live_prefix().0.to_string();

        for mode in Mode::ALL {
            manager.switch_mode(mode);
            assert!(manager.live_prefix().0.ends_with(&format!("{} ", mode.prefix())));
        }
        manager.switch_mode(Mode::Chat);

        assert_eq!(manager.live_prefix().0, original);
    }

    #[test]
    fn test_unknown_name_leaves_mode_unchanged() {
        let (mut manager, _) = manager(Path::new("/srv"));
        manager.switch_mode(Mode::Agent);

        assert!(manager.switch_mode_by_name("nomode").is_err());

        assert_eq!(manager.current_mode(), Mode::Agent);
        assert_eq!(manager.switch_mode_by_name("cmdmode").unwrap(), Mode::Command);
    }

    #[test]
    fn test_directory_change_is_reported_once() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        let (mut manager, dirs) = manager(root.path());

        assert!(!manager.check_directory_changed());
        assert!(!manager.check_directory_changed());

        dirs.set_current_dir(Path::new("sub")).unwrap();

        assert!(manager.check_directory_changed());
        assert!(!manager.check_directory_changed());
        assert_eq!(manager.current_dir(), root.path().join("sub"));
        assert!(manager.live_prefix().0.starts_with(&root.path().join("sub").display().to_string()));
    }

    #[test]
    fn test_change_dir_goes_through_provider() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("a")).unwrap();
        let (mut manager, _) = manager(root.path());

        manager.change_dir(Path::new("a")).unwrap();
        assert!(manager.change_dir(Path::new("missing")).is_err());

        assert!(manager.check_directory_changed());
    }

    #[test]
    fn test_unreadable_directory_is_fatal_at_start() {
        let err = ModeManager::new(Arc::new(BrokenDir), Mode::Chat).err().unwrap();
        assert!(matches!(err, NuwaError::Io { .. }));
    }

    #[test]
    fn test_system_prompt_follows_mode() {
        let (mut manager, _) = manager(Path::new("/"));

        assert!(manager.system_prompt().unwrap().contains("FILENAME"));
        manager.switch_mode(Mode::Command);
        assert!(manager.system_prompt().unwrap().contains("execute command:"));
        manager.switch_mode(Mode::Bash);
        assert!(manager.system_prompt().is_none());
    }
}
