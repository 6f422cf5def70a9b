//! Content digests and the external sync tool.
//!
//! Local digests and extraction are delegated to an external
//! content-addressable sync tool (`casync` by default), behind the
//! `SyncTool` trait. Remote digests are plain-text resources fetched
//! over HTTP from the channel directory.

use crate::errors::UpdateError;
use failure::Fallible;
use itertools::Itertools;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::{fmt, fs};

/// Root pattern file listing paths left out of tree digests.
pub(crate) static EXCLUDE_FILE: &str = ".caexclude";

/// Opaque content digest of a directory tree.
///
/// Digests are only ever compared for equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Digest(String);

impl Digest {
    /// Build a digest from raw tool or HTTP output.
    pub(crate) fn from_output(raw: &str) -> Fallible<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("empty digest");
        }
        Ok(Digest(trimmed.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Command contract of the external content-addressable sync tool.
pub(crate) trait SyncTool: Send + fmt::Debug {
    /// Compute the content digest of the tree at `path`.
    fn digest(&self, path: &Path) -> Fallible<Digest>;

    /// Extract the index at `index_url` into `dest`, reusing content from `seed`.
    fn extract(&self, index_url: &str, dest: &Path, seed: &Path) -> Fallible<()>;
}

/// `casync` command-line client.
#[derive(Clone, Debug)]
pub(crate) struct CasyncTool {
    /// Executable name or path.
    pub(crate) binary: PathBuf,
    /// Metadata feature set excluded from digests (`--without=`).
    pub(crate) without: String,
}

impl CasyncTool {
    fn run(&self, args: &[String]) -> Fallible<String> {
        trace!("running {:?} {:?}", self.binary, args);
        let output = Command::new(&self.binary).args(args).output().map_err(|e| {
            UpdateError::ToolInvocation(format!("failed to spawn {:?}: {}", self.binary, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UpdateError::ToolInvocation(format!(
                "{:?} {} exited with {}: {}",
                self.binary,
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            ))
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SyncTool for CasyncTool {
    fn digest(&self, path: &Path) -> Fallible<Digest> {
        if !path.exists() {
            return Err(UpdateError::ToolInvocation(format!(
                "digest target '{}' does not exist",
                path.display()
            ))
            .into());
        }

        let args = vec![
            "digest".to_string(),
            format!("--without={}", self.without),
            path.display().to_string(),
        ];
        let out = self.run(&args)?;
        let digest = Digest::from_output(&out).map_err(|e| {
            UpdateError::ToolInvocation(format!("bad digest for '{}': {}", path.display(), e))
        })?;
        debug!("local digest of '{}': {}", path.display(), digest);
        Ok(digest)
    }

    fn extract(&self, index_url: &str, dest: &Path, seed: &Path) -> Fallible<()> {
        let args = vec![
            "extract".to_string(),
            index_url.to_string(),
            dest.display().to_string(),
            format!("--seed={}", seed.display()),
        ];
        self.run(&args)?;
        Ok(())
    }
}

/// Paths excluded from digests of the tree at `root`.
///
/// Blank lines and `#` comments are skipped, and anchored patterns lose
/// their leading `/`. A missing pattern file excludes nothing.
pub(crate) fn read_exclusions(root: &Path) -> Fallible<Vec<String>> {
    let path = root.join(EXCLUDE_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => {
            return Err(
                UpdateError::fs(format!("failed to read '{}'", path.display()), e).into(),
            )
        }
    };

    let patterns = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_start_matches('/').to_string())
        .collect();
    Ok(patterns)
}

/// Check that digests of the tree at `root` ignore every `required` path.
pub(crate) fn check_exclusions(root: &Path, required: &[String]) -> Fallible<()> {
    let excluded = read_exclusions(root)?;
    let missing: Vec<&String> = required
        .iter()
        .filter(|r| !excluded.contains(r))
        .collect();
    if !missing.is_empty() {
        return Err(UpdateError::Filesystem(format!(
            "'{}' does not exclude {}",
            root.join(EXCLUDE_FILE).display(),
            missing.iter().join(", ")
        ))
        .into());
    }
    Ok(())
}

/// HTTP directory holding per-channel `.digest` and `.caidx` resources.
#[derive(Clone, Debug)]
pub(crate) struct RemoteChannels {
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl RemoteChannels {
    pub(crate) fn new(base_url: reqwest::Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn resource(&self, remote_id: &str, ext: &str) -> String {
        format!(
            "{}/{}.{}",
            self.base_url.as_str().trim_end_matches('/'),
            remote_id,
            ext
        )
    }

    /// Location of the sync index for a remote channel.
    pub(crate) fn index_url(&self, remote_id: &str) -> String {
        self.resource(remote_id, "caidx")
    }

    /// Location of the digest resource for a remote channel.
    pub(crate) fn digest_url(&self, remote_id: &str) -> String {
        self.resource(remote_id, "digest")
    }

    /// Fetch the published digest of a remote channel.
    pub(crate) fn remote_digest(&self, remote_id: &str) -> Fallible<Digest> {
        let endpoint = self.digest_url(remote_id);
        trace!("GET remote digest: {}", endpoint);

        let mut resp = self
            .client
            .get(&endpoint)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| UpdateError::Network(format!("GET {}: {}", endpoint, e)))?;
        let body = resp
            .text()
            .map_err(|e| UpdateError::Network(format!("reading {}: {}", endpoint, e)))?;

        let digest = Digest::from_output(&body)
            .map_err(|e| UpdateError::Network(format!("GET {}: {}", endpoint, e)))?;
        debug!("remote digest of '{}': {}", remote_id, digest);
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{kind_of, UpdateError};
    use crate::testutil;
    use std::fs;

    #[test]
    fn digest_output_is_trimmed() {
        let d = Digest::from_output("  abc123\n").unwrap();
        assert_eq!(d.to_string(), "abc123");
        assert_eq!(d, Digest::from_output("abc123").unwrap());
        assert!(Digest::from_output(" \n").is_err());
    }

    #[test]
    fn resource_urls() {
        let base = reqwest::Url::parse("https://example.com/channels/").unwrap();
        let remote = RemoteChannels::new(base);
        assert_eq!(
            remote.digest_url("release"),
            "https://example.com/channels/release.digest"
        );
        assert_eq!(
            remote.index_url("master-ci"),
            "https://example.com/channels/master-ci.caidx"
        );
    }

    #[test]
    fn casync_command_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("args.log");
        let script = testutil::write_script(
            tmp.path(),
            "fake-casync",
            &format!("echo \"$@\" >> '{}'\necho '  d1g3st  '", log.display()),
        );
        let tool = CasyncTool {
            binary: script,
            without: "all".to_string(),
        };
        let tree = tmp.path().join("tree");
        fs::create_dir(&tree).unwrap();

        let digest = tool.digest(&tree).unwrap();
        assert_eq!(digest.to_string(), "d1g3st");

        let dest = tmp.path().join("dest");
        tool.extract("http://host/release.caidx", &dest, &tree)
            .unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls[0], format!("digest --without=all {}", tree.display()));
        assert_eq!(
            calls[1],
            format!(
                "extract http://host/release.caidx {} --seed={}",
                dest.display(),
                tree.display()
            )
        );
    }

    #[test]
    fn casync_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let script = testutil::write_script(tmp.path(), "failing", "echo boom >&2\nexit 3");
        let tool = CasyncTool {
            binary: script,
            without: "all".to_string(),
        };

        let err = tool.digest(tmp.path()).unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::ToolInvocation(_))));

        let err = tool.digest(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::ToolInvocation(_))));

        let missing = CasyncTool {
            binary: tmp.path().join("no-such-binary"),
            without: "all".to_string(),
        };
        let err = missing.digest(tmp.path()).unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::ToolInvocation(_))));
    }

    #[test]
    fn exclusions_are_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_exclusions(tmp.path()).unwrap().is_empty());

        fs::write(
            tmp.path().join(EXCLUDE_FILE),
            "# volatile\n/.update_channel\n\n  logs  \n",
        )
        .unwrap();
        assert_eq!(
            read_exclusions(tmp.path()).unwrap(),
            vec![".update_channel", "logs"]
        );

        let required = vec![".update_channel".to_string()];
        check_exclusions(tmp.path(), &required).unwrap();
        let required = vec!["logs".to_string(), "cache".to_string()];
        let err = check_exclusions(tmp.path(), &required).unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::Filesystem(_))));
        assert!(err.to_string().ends_with("does not exclude cache"), "{}", err);
    }

    #[test]
    fn remote_digest_over_http() {
        let server = testutil::RemoteDir::start();
        server.set_digest("release", "\n  cafe01 \n");
        let remote = RemoteChannels::new(server.base_url());

        let digest = remote.remote_digest("release").unwrap();
        assert_eq!(digest.to_string(), "cafe01");

        let err = remote.remote_digest("missing").unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::Network(_))));
    }

    #[test]
    fn remote_digest_transport_failure() {
        let base = reqwest::Url::parse("http://127.0.0.1:1/").unwrap();
        let remote = RemoteChannels::new(base);
        let err = remote.remote_digest("release").unwrap_err();
        assert!(matches!(kind_of(&err), Some(UpdateError::Network(_))));
    }
}
