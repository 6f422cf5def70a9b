//! Staging area management.

use crate::errors::UpdateError;
use crate::tree;
use failure::Fallible;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::process::Command;

/// Name of the sync destination under the staging root.
static SYNC_DIR: &str = "casync";

/// Permissions of freshly created staging directories.
const STAGING_MODE: u32 = 0o755;

/// Owner of the staging root and its sync destination.
#[derive(Clone, Debug)]
pub(crate) struct StagingManager {
    root: PathBuf,
    /// Whether to try `sudo rm -rf` before a plain removal.
    privileged_removal: bool,
}

impl StagingManager {
    pub(crate) fn new(root: impl Into<PathBuf>, privileged_removal: bool) -> Self {
        Self {
            root: root.into(),
            privileged_removal,
        }
    }

    /// Directory where fetched images land.
    pub(crate) fn sync_dir(&self) -> PathBuf {
        self.root.join(SYNC_DIR)
    }

    /// Wipe and recreate an empty staging tree.
    ///
    /// Leftovers may belong to another user (e.g. a privileged sync
    /// process), so a non-interactive `sudo rm -rf` is attempted first
    /// and a plain removal runs afterwards for whatever remains.
    pub(crate) fn init(&self) -> Fallible<()> {
        if self.privileged_removal {
            self.privileged_remove();
        }
        tree::remove_tree(&self.root)?;

        for dir in &[self.root.clone(), self.sync_dir()] {
            DirBuilder::new()
                .recursive(true)
                .mode(STAGING_MODE)
                .create(dir)
                .map_err(|e| UpdateError::fs(format!("failed to create '{}'", dir.display()), e))?;
        }

        info!("staging tree initialized at '{}'", self.root.display());
        Ok(())
    }

    fn privileged_remove(&self) {
        let status = Command::new("sudo")
            .arg("-n")
            .arg("rm")
            .arg("-rf")
            .arg(&self.root)
            .status();
        match status {
            Ok(s) if s.success() => trace!("privileged removal of '{}' done", self.root.display()),
            Ok(s) => warn!("privileged removal of '{}' failed: {}", self.root.display(), s),
            Err(e) => warn!("privileged removal of '{}' failed: {}", self.root.display(), e),
        }
    }
}
