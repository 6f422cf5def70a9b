//! Content-addressable sync update strategy.
//!
//! Updates are fetched with the external sync tool into a staging tree,
//! seeded from the running system, then copied into the finalized tree.
//! The consistency flag brackets every mutation of the finalized tree:
//! it is cleared before the old tree is removed and set only once the
//! new tree and its channel record are fully written.

use super::{UpdateStrategy, UNKNOWN_CHANNEL};
use crate::channels::ChannelRegistry;
use crate::config::AgentConfig;
use crate::digest::{self, Digest, RemoteChannels, SyncTool};
use crate::errors::UpdateError;
use crate::flag::ConsistencyFlag;
use crate::metadata;
use crate::staging::StagingManager;
use crate::tree;
use failure::Fallible;
use itertools::Itertools;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Channel record, written at the root of the finalized tree.
pub(crate) static CHANNEL_RECORD: &str = ".update_channel";

#[derive(Debug)]
pub(crate) struct StratCasync {
    tool: Box<dyn SyncTool>,
    remote: RemoteChannels,
    channels: ChannelRegistry,
    target: String,
    running: PathBuf,
    finalized: PathBuf,
    staging: StagingManager,
    flag: ConsistencyFlag,
    /// Paths that staged trees must exclude from their digests.
    exclude: Vec<String>,
}

impl StratCasync {
    pub(crate) fn new(cfg: &AgentConfig, tool: Box<dyn SyncTool>) -> Fallible<Self> {
        let target_name = match cfg.target_channel {
            Some(ref name) => name.clone(),
            None => {
                let current = channel_of(&cfg.paths.running);
                if cfg.channels.contains(&current) {
                    current
                } else {
                    let fallback = cfg.channels.first().name.clone();
                    warn!(
                        "current channel '{}' is not configured, following '{}'",
                        current, fallback
                    );
                    fallback
                }
            }
        };
        cfg.channels.resolve(&target_name)?;

        let exclude = std::iter::once(CHANNEL_RECORD.to_string())
            .chain(cfg.exclude.iter().cloned())
            .unique()
            .collect();

        Ok(Self {
            tool,
            remote: RemoteChannels::new(cfg.base_url.clone()),
            channels: cfg.channels.clone(),
            target: target_name,
            running: cfg.paths.running.clone(),
            finalized: cfg.paths.finalized.clone(),
            staging: StagingManager::new(&cfg.paths.staging_root, cfg.privileged_removal),
            flag: ConsistencyFlag::new(&cfg.paths.consistent_flag),
            exclude,
        })
    }

    fn remote_digest(&self) -> Fallible<Digest> {
        let remote_id = self.channels.resolve(&self.target)?;
        self.remote.remote_digest(remote_id)
    }

    /// Whether the finalized tree is flagged consistent and matches `remote`.
    fn finalized_matches(&self, remote: &Digest) -> Fallible<bool> {
        if !self.flag.get()? {
            trace!("consistency flag not set");
            return Ok(false);
        }
        if !self.finalized.is_dir() {
            warn!(
                "consistency flag set, but '{}' is missing",
                self.finalized.display()
            );
            return Ok(false);
        }
        let local = self.tool.digest(&self.finalized)?;
        Ok(&local == remote)
    }

    /// Version label and release notes of the tree at `path`.
    ///
    /// Never fails: missing metadata degrades to empty strings.
    pub(crate) fn describe(&self, path: &Path) -> (String, String) {
        let channel = channel_of(path);
        let version = metadata::version(path).unwrap_or_else(|e| {
            error!("failed to read version of '{}': {}", path.display(), e);
            String::new()
        });
        let notes = metadata::release_notes(path).unwrap_or_else(|e| {
            error!("failed to read release notes of '{}': {}", path.display(), e);
            String::new()
        });

        (format!("{} / {}", version, channel), notes)
    }

    fn write_channel_record(&self) -> Fallible<()> {
        let path = self.finalized.join(CHANNEL_RECORD);
        let mut fp = fs::File::create(&path)
            .map_err(|e| UpdateError::fs(format!("failed to create '{}'", path.display()), e))?;
        writeln!(fp, "{}", self.target)
            .and_then(|_| fp.sync_all())
            .map_err(|e| UpdateError::fs(format!("failed to write '{}'", path.display()), e))?;
        Ok(())
    }
}

impl UpdateStrategy for StratCasync {
    fn name(&self) -> &'static str {
        "casync"
    }

    fn init(&self) -> Fallible<()> {
        self.staging.init()
    }

    fn available_channels(&self) -> Vec<String> {
        self.channels.available_channels()
    }

    fn target_channel(&self) -> &str {
        &self.target
    }

    fn current_channel(&self) -> String {
        channel_of(&self.running)
    }

    fn update_available(&self) -> Fallible<bool> {
        let remote = self.remote_digest()?;

        let running = self.tool.digest(&self.running)?;
        if running == remote {
            debug!("running system matches channel '{}'", self.target);
            return Ok(false);
        }
        if self.finalized_matches(&remote)? {
            debug!("update for channel '{}' already finalized", self.target);
            return Ok(false);
        }

        info!(
            "update available on channel '{}' (running {}, remote {})",
            self.target, running, remote
        );
        Ok(true)
    }

    fn update_ready(&self) -> Fallible<bool> {
        if !self.flag.get()? {
            return Ok(false);
        }
        let remote = self.remote_digest()?;
        self.finalized_matches(&remote)
    }

    fn fetch_update(&self) -> Fallible<()> {
        let dest = self.staging.sync_dir();
        if !dest.is_dir() {
            return Err(UpdateError::Fetch(format!(
                "staging tree '{}' not initialized",
                dest.display()
            ))
            .into());
        }

        let index_url = self.remote.index_url(self.channels.resolve(&self.target)?);
        info!("fetching '{}' into '{}'", index_url, dest.display());
        self.tool
            .extract(&index_url, &dest, &self.running)
            .map_err(|e| UpdateError::Fetch(format!("extracting '{}': {}", index_url, e)))?;

        info!("fetched channel '{}'", self.target);
        Ok(())
    }

    fn finalize_update(&self) -> Fallible<()> {
        let staged = self.staging.sync_dir();
        if !staged.is_dir() {
            return Err(UpdateError::Filesystem(format!(
                "no staged update at '{}'",
                staged.display()
            ))
            .into());
        }
        // The channel record would otherwise change the finalized digest.
        digest::check_exclusions(&staged, &self.exclude)?;

        info!("creating finalized update at '{}'", self.finalized.display());
        self.flag.set(false)?;
        tree::remove_tree(&self.finalized)?;
        tree::copy_tree(&staged, &self.finalized)?;
        self.write_channel_record()?;
        self.flag.set(true)?;

        info!("finalized update for channel '{}'", self.target);
        Ok(())
    }

    fn describe_current_channel(&self) -> (String, String) {
        self.describe(&self.running)
    }

    fn describe_ready_channel(&self) -> (String, String) {
        match self.update_ready() {
            Ok(true) => self.describe(&self.finalized),
            Ok(false) => (String::new(), String::new()),
            Err(e) => {
                error!("failed to check update readiness: {}", e);
                (String::new(), String::new())
            }
        }
    }

    fn cleanup(&self) -> Fallible<()> {
        // Staging is kept until the next `init`.
        Ok(())
    }
}

/// Best-known channel of the tree at `path`.
///
/// Tries the channel record, then the VCS branch; each failure is
/// logged and the next source is tried.
pub(crate) fn channel_of(path: &Path) -> String {
    match read_channel_record(path) {
        Ok(c) => return c,
        Err(e) => debug!("no channel record in '{}': {}", path.display(), e),
    }
    match git_branch(path) {
        Ok(b) => return b,
        Err(e) => warn!("failed to get branch of '{}': {}", path.display(), e),
    }
    UNKNOWN_CHANNEL.to_string()
}

fn read_channel_record(path: &Path) -> Fallible<String> {
    let record = path.join(CHANNEL_RECORD);
    let content = fs::read_to_string(&record)
        .map_err(|e| UpdateError::fs(format!("failed to read '{}'", record.display()), e))?;
    let name = content.trim();
    if name.is_empty() {
        bail!("empty channel record '{}'", record.display());
    }
    Ok(name.to_string())
}

fn git_branch(path: &Path) -> Fallible<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(&["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .map_err(|e| UpdateError::ToolInvocation(format!("failed to spawn git: {}", e)))?;
    if !output.status.success() {
        return Err(UpdateError::ToolInvocation(format!(
            "git rev-parse exited with {}",
            output.status
        ))
        .into());
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() || branch == "HEAD" {
        bail!("no branch checked out in '{}'", path.display());
    }
    Ok(branch)
}
