//! Release metadata reader.
//!
//! Version and release notes are read from well-known files at the root
//! of a system tree. Their format is owned by release packaging.

use crate::errors::UpdateError;
use failure::Fallible;
use std::fs;
use std::path::Path;

/// Version file, first non-empty line is the version string.
pub(crate) static VERSION_FILE: &str = "VERSION";

/// Release notes file, first section is shown to users.
pub(crate) static RELEASE_NOTES_FILE: &str = "RELEASES.md";

/// Read the version string of the tree at `path`.
pub(crate) fn version(path: &Path) -> Fallible<String> {
    let content = read_file(path, VERSION_FILE)?;
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            UpdateError::MetadataMissing(format!("empty {} in '{}'", VERSION_FILE, path.display()))
                .into()
        })
}

/// Read the notes for the latest release of the tree at `path`.
pub(crate) fn release_notes(path: &Path) -> Fallible<String> {
    let content = read_file(path, RELEASE_NOTES_FILE)?;
    let normalized = content.replace("\r\n", "\n");
    let notes = normalized
        .trim_start()
        .split("\n\n")
        .next()
        .unwrap_or_default()
        .trim();
    if notes.is_empty() {
        return Err(UpdateError::MetadataMissing(format!(
            "empty {} in '{}'",
            RELEASE_NOTES_FILE,
            path.display()
        ))
        .into());
    }
    Ok(notes.to_string())
}

fn read_file(root: &Path, name: &str) -> Fallible<String> {
    let path = root.join(name);
    fs::read_to_string(&path).map_err(|e| {
        UpdateError::MetadataMissing(format!("failed to read '{}': {}", path.display(), e)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::kind_of;

    #[test]
    fn reads_version_and_notes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), "\n  0.9.4 \nignored\n").unwrap();
        fs::write(
            tmp.path().join(RELEASE_NOTES_FILE),
            "Version 0.9.4\n * faster boot\n * bug fixes\n\nVersion 0.9.3\n * older\n",
        )
        .unwrap();

        assert_eq!(version(tmp.path()).unwrap(), "0.9.4");
        assert_eq!(
            release_notes(tmp.path()).unwrap(),
            "Version 0.9.4\n * faster boot\n * bug fixes"
        );
    }

    #[test]
    fn missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        for err in &[
            version(tmp.path()).unwrap_err(),
            release_notes(tmp.path()).unwrap_err(),
        ] {
            assert!(matches!(kind_of(err), Some(UpdateError::MetadataMissing(_))));
        }
    }

    #[test]
    fn empty_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), "\n \n").unwrap();
        fs::write(tmp.path().join(RELEASE_NOTES_FILE), "\n\n").unwrap();
        assert!(version(tmp.path()).is_err());
        assert!(release_notes(tmp.path()).is_err());
    }
}
