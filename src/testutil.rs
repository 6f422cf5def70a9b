//! Shared test helpers.

use crate::digest::{self, Digest, SyncTool, EXCLUDE_FILE};
use crate::errors::UpdateError;
use crate::tree;
use failure::Fallible;
use httpmock::Method::GET;
use httpmock::MockServer;
use sha2::{Digest as _, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Write an executable shell script into `dir`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Mock channel directory publishing `<remote>.digest` resources.
///
/// Unknown resources answer 404.
pub(crate) struct RemoteDir {
    server: MockServer,
    digests: RefCell<BTreeMap<String, String>>,
}

impl RemoteDir {
    pub(crate) fn start() -> Self {
        Self {
            server: MockServer::start(),
            digests: RefCell::new(BTreeMap::new()),
        }
    }

    pub(crate) fn base_url(&self) -> reqwest::Url {
        reqwest::Url::parse(&self.server.url("/")).unwrap()
    }

    /// Publish (or replace) the digest body of a remote channel.
    pub(crate) fn set_digest(&self, remote_id: &str, body: &str) {
        self.digests
            .borrow_mut()
            .insert(remote_id.to_string(), body.to_string());

        self.server.reset();
        for (id, body) in self.digests.borrow().iter() {
            self.server.mock(|when, then| {
                when.method(GET).path(format!("/{}.digest", id));
                then.status(200).body(body);
            });
        }
    }
}

/// In-process stand-in for the external sync tool.
///
/// Digests hash relative paths, file contents and symlink targets,
/// skipping entries listed in the tree's root `.caexclude`. Extraction
/// copies a registered source tree for each index URL.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeTool {
    indexes: Arc<Mutex<BTreeMap<String, PathBuf>>>,
    pub(crate) extract_calls: Arc<Mutex<Vec<(String, PathBuf, PathBuf)>>>,
}

impl FakeTool {
    pub(crate) fn publish(&self, index_url: &str, source: &Path) {
        self.indexes
            .lock()
            .unwrap()
            .insert(index_url.to_string(), source.to_path_buf());
    }
}

impl SyncTool for FakeTool {
    fn digest(&self, path: &Path) -> Fallible<Digest> {
        if !path.exists() {
            return Err(UpdateError::ToolInvocation(format!("{} missing", path.display())).into());
        }
        Digest::from_output(&tree_hash(path))
    }

    fn extract(&self, index_url: &str, dest: &Path, seed: &Path) -> Fallible<()> {
        self.extract_calls.lock().unwrap().push((
            index_url.to_string(),
            dest.to_path_buf(),
            seed.to_path_buf(),
        ));
        let source = match self.indexes.lock().unwrap().get(index_url) {
            Some(s) => s.clone(),
            None => {
                return Err(UpdateError::ToolInvocation(format!("no index at {}", index_url)).into())
            }
        };
        for entry in fs::read_dir(&source)? {
            let entry = entry?;
            tree::copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
        Ok(())
    }
}

/// Hash a tree the way `FakeTool` does.
pub(crate) fn tree_hash(root: &Path) -> String {
    let excluded = digest::read_exclusions(root).unwrap();

    let mut hasher = Sha256::new();
    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));
    for entry in walker {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap();
        let rel_str = rel.to_string_lossy().to_string();
        if excluded.iter().any(|e| e == &rel_str) {
            continue;
        }
        hasher.update(rel_str.as_bytes());
        hasher.update(b"\0");
        let ftype = entry.file_type();
        if ftype.is_symlink() {
            let target = fs::read_link(entry.path()).unwrap();
            hasher.update(b"L");
            hasher.update(target.to_string_lossy().as_bytes());
        } else if ftype.is_dir() {
            hasher.update(b"D");
        } else {
            hasher.update(b"F");
            hasher.update(&fs::read(entry.path()).unwrap());
        }
        hasher.update(b"\0");
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Populate a release tree with version metadata and a payload.
pub(crate) fn make_release(root: &Path, version: &str, notes: &str) {
    fs::create_dir_all(root.join("system")).unwrap();
    fs::write(root.join("VERSION"), format!("{}\n", version)).unwrap();
    fs::write(root.join("RELEASES.md"), notes).unwrap();
    fs::write(root.join("system/payload.bin"), version.as_bytes()).unwrap();
    fs::write(root.join(EXCLUDE_FILE), ".update_channel\n").unwrap();
    std::os::unix::fs::symlink("../VERSION", root.join("system/version-link")).unwrap();
}
