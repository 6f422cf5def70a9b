//! Consistency flag store.
//!
//! The flag is a marker file: present means the finalized tree is
//! consistent and can be activated. Every access goes to disk and every
//! change is synced, so the value observed after a crash is the last one
//! that was successfully set.

use crate::errors::UpdateError;
use failure::Fallible;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Persisted consistency flag for the finalized tree.
#[derive(Clone, Debug)]
pub(crate) struct ConsistencyFlag {
    path: PathBuf,
}

impl ConsistencyFlag {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the flag from disk.
    pub(crate) fn get(&self) -> Fallible<bool> {
        match fs::symlink_metadata(&self.path) {
            Ok(_) => Ok(true),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UpdateError::fs(
                format!("failed to read consistency flag '{}'", self.path.display()),
                e,
            )
            .into()),
        }
    }

    /// Durably write the flag.
    pub(crate) fn set(&self, value: bool) -> Fallible<()> {
        let parent = self.parent();
        fs::create_dir_all(parent).map_err(|e| {
            UpdateError::fs(format!("failed to create '{}'", parent.display()), e)
        })?;

        if value {
            // Write then rename, so a crash never leaves a torn marker behind.
            let tmp = self.path.with_extension("tmp");
            let mut fp = fs::File::create(&tmp)
                .map_err(|e| UpdateError::fs(format!("failed to create '{}'", tmp.display()), e))?;
            fp.write_all(b"1\n")
                .and_then(|_| fp.sync_all())
                .map_err(|e| UpdateError::fs(format!("failed to write '{}'", tmp.display()), e))?;
            fs::rename(&tmp, &self.path).map_err(|e| {
                UpdateError::fs(format!("failed to rename to '{}'", self.path.display()), e)
            })?;
        } else {
            match fs::remove_file(&self.path) {
                Ok(_) => {}
                Err(ref e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(UpdateError::fs(
                        format!("failed to clear '{}'", self.path.display()),
                        e,
                    )
                    .into())
                }
            }
        }

        sync_dir(parent)?;
        debug!("consistency flag set to {}", value);
        Ok(())
    }

    fn parent(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

fn sync_dir(dir: &Path) -> Fallible<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| UpdateError::fs(format!("failed to sync '{}'", dir.display()), e))?;
    Ok(())
}
