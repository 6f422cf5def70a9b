//! Directory tree helpers.

use crate::errors::UpdateError;
use failure::Fallible;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::Path;

/// Recursively copy `src` to `dst`, recreating symbolic links verbatim.
///
/// Links are never dereferenced: the copy holds a link with the same
/// target string, even when that target is dangling or relative.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Fallible<()> {
    let metadata = fs::symlink_metadata(src)
        .map_err(|e| UpdateError::fs(format!("failed to stat '{}'", src.display()), e))?;
    let ftype = metadata.file_type();

    if ftype.is_symlink() {
        let target = fs::read_link(src)
            .map_err(|e| UpdateError::fs(format!("failed to read link '{}'", src.display()), e))?;
        symlink(&target, dst).map_err(|e| {
            UpdateError::fs(
                format!("failed to link '{}' -> '{}'", dst.display(), target.display()),
                e,
            )
        })?;
        return Ok(());
    }

    if ftype.is_dir() {
        fs::create_dir_all(dst)
            .map_err(|e| UpdateError::fs(format!("failed to create '{}'", dst.display()), e))?;
        let entries = fs::read_dir(src)
            .map_err(|e| UpdateError::fs(format!("failed to list '{}'", src.display()), e))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| UpdateError::fs(format!("failed to list '{}'", src.display()), e))?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        fs::set_permissions(dst, metadata.permissions()).map_err(|e| {
            UpdateError::fs(format!("failed to set permissions on '{}'", dst.display()), e)
        })?;
        return Ok(());
    }

    fs::copy(src, dst).map_err(|e| {
        UpdateError::fs(
            format!("failed to copy '{}' to '{}'", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// Remove the tree at `path`, tolerating its absence.
pub(crate) fn remove_tree(path: &Path) -> Fallible<()> {
    match fs::symlink_metadata(path) {
        Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(UpdateError::fs(format!("failed to stat '{}'", path.display()), e).into()),
        Ok(m) if !m.is_dir() => {
            fs::remove_file(path)
                .map_err(|e| UpdateError::fs(format!("failed to remove '{}'", path.display()), e))?;
        }
        Ok(_) => {
            fs::remove_dir_all(path)
                .map_err(|e| UpdateError::fs(format!("failed to remove '{}'", path.display()), e))?;
        }
    }
    Ok(())
}
