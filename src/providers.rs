//! Shared provider traits for dependency injection.
//!
//! The process working directory and the wall clock are process-wide state.
//! Putting them behind traits lets the mode manager and the agent prompt be
//! tested without touching the real environment.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for providing timestamps.
///
/// # Example
///
/// ```
/// use nuwa_terminal::providers::{TimeProvider, SystemTimeProvider};
///
/// let provider = SystemTimeProvider;
/// assert!(provider.now() > 0);
/// ```
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in seconds.
    fn now(&self) -> u64;

    /// Returns the current time formatted as RFC 3339 (UTC).
    fn now_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp(self.now() as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    }
}

/// Default time provider using system time.
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Trait for reading and changing the working directory.
pub trait DirProvider: Send + Sync {
    fn current_dir(&self) -> std::io::Result<PathBuf>;

    fn set_current_dir(&self, path: &Path) -> std::io::Result<()>;
}

/// The real process working directory.
pub struct SystemDirProvider;

impl DirProvider for SystemDirProvider {
    fn current_dir(&self) -> std::io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn set_current_dir(&self, path: &Path) -> std::io::Result<()> {
        std::env::set_current_dir(path)
    }
}

/// In-memory working directory, for tests and embedding.
///
/// `set_current_dir` only accepts existing directories, like the real thing.
pub struct FixedDirProvider {
    dir: Mutex<PathBuf>,
}

impl FixedDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Mutex::new(dir.into()),
        }
    }
}

impl DirProvider for FixedDirProvider {
    fn current_dir(&self) -> std::io::Result<PathBuf> {
        Ok(self.dir.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set_current_dir(&self, path: &Path) -> std::io::Result<()> {
        let mut dir = self.dir.lock().unwrap_or_else(|e| e.into_inner());
        let target = dir.join(path);
        if !target.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {}", target.display()),
            ));
        }
        *dir = target;
        Ok(())
    }
}
