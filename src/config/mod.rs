//! Configuration parsing and validation.
//!
//! This module contains three logical entities:
//!  * Snippets: single configuration files, holding a subset of configuration entries.
//!  * Inputs: configuration snippets merged, but not yet validated.
//!  * AgentConfig: validated configuration for the update agent.

mod inputs;
mod snippets;

use crate::channels::{Channel, ChannelRegistry};
use crate::errors::UpdateError;
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) use inputs::ConfigInput;

/// Default configuration directories, in increasing priority.
pub(crate) static DEFAULT_CONFIG_DIRS: &[&str] = &["/usr/lib", "/run", "/etc"];

static DEFAULT_BASE_URL: &str = "https://commadist.blob.core.windows.net/openpilot-channels";
static DEFAULT_BINARY: &str = "casync";
static DEFAULT_WITHOUT: &str = "all";
static DEFAULT_RUNNING: &str = "/data/openpilot";
static DEFAULT_STAGING_ROOT: &str = "/data/safe_staging/staging";
static DEFAULT_FINALIZED: &str = "/data/safe_staging/finalized";
static DEFAULT_FLAG: &str = "/data/safe_staging/consistent";

/// Runtime configuration for the agent.
///
/// It holds validated agent configuration.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct AgentConfig {
    pub(crate) strategy: String,
    /// Explicit target channel, if configured.
    pub(crate) target_channel: Option<String>,
    pub(crate) refresh_period: Duration,
    #[serde(serialize_with = "serialize_url")]
    pub(crate) base_url: reqwest::Url,
    pub(crate) binary: PathBuf,
    pub(crate) without: String,
    /// Extra paths that release trees must exclude from digests.
    pub(crate) exclude: Vec<String>,
    pub(crate) channels: ChannelRegistry,
    pub(crate) paths: Paths,
    pub(crate) privileged_removal: bool,
}

/// Well-known filesystem locations.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Paths {
    pub(crate) running: PathBuf,
    pub(crate) staging_root: PathBuf,
    pub(crate) finalized: PathBuf,
    pub(crate) consistent_flag: PathBuf,
}

impl AgentConfig {
    pub(crate) fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let cfg = ConfigInput::read_config(dirs)?;
        Self::try_from_input(cfg)
    }

    /// Validate inputs and return a valid agent configuration.
    pub(crate) fn try_from_input(cfg: ConfigInput) -> Fallible<Self> {
        let base_url = reqwest::Url::parse(or_default(&cfg.casync.base_url, DEFAULT_BASE_URL))
            .context("invalid casync base_url")?;

        let channels = cfg
            .channels
            .into_iter()
            .map(|c| Channel {
                name: c.name,
                remote: c.remote,
            })
            .collect();
        let channels = ChannelRegistry::try_new(channels)?;

        let target_channel = if cfg.updates.channel.is_empty() {
            None
        } else {
            if !channels.contains(&cfg.updates.channel) {
                return Err(UpdateError::UnknownChannel(cfg.updates.channel).into());
            }
            Some(cfg.updates.channel)
        };

        let exclude = cfg
            .casync
            .exclude
            .iter()
            .map(|x| x.trim().trim_start_matches('/').to_string())
            .collect::<Vec<_>>();
        for x in &exclude {
            if x.is_empty() || Path::new(x).components().any(|c| c.as_os_str() == "..") {
                bail!("invalid digest exclusion '{}'", x);
            }
        }

        if cfg.updates.refresh_period_secs == 0 {
            bail!("refresh_period_secs must be positive");
        }

        let paths = Paths {
            running: PathBuf::from(or_default(&cfg.paths.running, DEFAULT_RUNNING)),
            staging_root: PathBuf::from(or_default(&cfg.paths.staging_root, DEFAULT_STAGING_ROOT)),
            finalized: PathBuf::from(or_default(&cfg.paths.finalized, DEFAULT_FINALIZED)),
            consistent_flag: PathBuf::from(or_default(&cfg.paths.consistent_flag, DEFAULT_FLAG)),
        };
        paths.validate()?;

        let state = AgentConfig {
            strategy: or_default(&cfg.updates.strategy, "casync").to_string(),
            target_channel,
            refresh_period: Duration::from_secs(cfg.updates.refresh_period_secs),
            base_url,
            binary: PathBuf::from(or_default(&cfg.casync.binary, DEFAULT_BINARY)),
            without: or_default(&cfg.casync.without, DEFAULT_WITHOUT).to_string(),
            exclude,
            channels,
            paths,
            privileged_removal: cfg.staging.privileged_removal,
        };
        debug!(
            "Runtime configuration:\n{}",
            serde_json::to_string_pretty(&state).unwrap_or_default()
        );

        Ok(state)
    }
}

impl Paths {
    /// Check that state locations do not overlap.
    ///
    /// Wiping staging or replacing the finalized tree must never touch
    /// the other tree nor the consistency flag.
    fn validate(&self) -> Fallible<()> {
        let trees = [
            ("staging_root", &self.staging_root),
            ("finalized", &self.finalized),
        ];
        for (name, tree) in &trees {
            if !tree.is_absolute() {
                bail!("{} path '{}' is not absolute", name, tree.display());
            }
            if self.consistent_flag.starts_with(tree) {
                bail!(
                    "consistent_flag '{}' must live outside {} '{}'",
                    self.consistent_flag.display(),
                    name,
                    tree.display()
                );
            }
        }
        if nested(&self.staging_root, &self.finalized) {
            bail!(
                "staging_root '{}' and finalized '{}' must not be nested",
                self.staging_root.display(),
                self.finalized.display()
            );
        }
        if nested(&self.running, &self.staging_root) || nested(&self.running, &self.finalized) {
            bail!("running tree '{}' overlaps update trees", self.running.display());
        }
        Ok(())
    }
}

fn serialize_url<S: serde::Serializer>(url: &reqwest::Url, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(url.as_str())
}

fn nested(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}
