//! Scratch directories that survive failures.
//!
//! A [`ScratchDir`] is removed when dropped on the success path. If it was
//! marked failed, or the thread is unwinding, it is left on disk and its
//! location logged so the artifacts can be inspected.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::Result;

/// Exclusively owned scratch space for one case.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
    failed: bool,
}

impl ScratchDir {
    /// Creates a fresh directory, inside `root` when a pre-provisioned
    /// scratch root is given.
    pub fn create(prefix: &str, root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created scratch directory");
        Ok(Self {
            dir: Some(dir),
            path,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `contents` to `name` inside the directory.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let file = self.path.join(name);
        fs::write(&file, contents)?;
        Ok(file)
    }

    /// Keeps the directory when the guard drops.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub const fn is_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.failed || std::thread::panicking() {
            #[allow(deprecated)]
            let kept = dir.into_path();
            warn!(path = %kept.display(), "keeping scratch directory for inspection");
            return;
        }
        if let Err(e) = dir.close() {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_success() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create("ok-", Some(root.path())).unwrap();
        let path = scratch.path().to_path_buf();
        scratch.write("attempt-1.log", "PASSED").unwrap();
        assert!(path.join("attempt-1.log").exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_when_marked_failed() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create("bad-", Some(root.path())).unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.starts_with(root.path()));
        scratch.write("failure.json", "{}").unwrap();
        scratch.mark_failed();
        assert!(scratch.is_failed());
        drop(scratch);
        assert!(path.join("failure.json").exists());
    }

    #[test]
    fn test_kept_when_panicking() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let _scratch = ScratchDir::create("panic-", Some(&root_path)).unwrap();
            panic!("trial blew up");
        });
        assert!(result.is_err());
        let leftovers = fs::read_dir(root.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_creates_missing_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("provisioned").join("tmp");
        let scratch = ScratchDir::create("nested-", Some(&root)).unwrap();
        assert!(scratch.path().starts_with(&root));
    }
}
