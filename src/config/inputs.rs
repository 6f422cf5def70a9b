use crate::channels::DEFAULT_CHANNELS;
use crate::config::snippets;
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};

/// Sub-directory (under each config dir) holding TOML snippets.
static SNIPPETS_DIR: &str = "casync-updater.d";

/// Runtime configuration holding environmental inputs.
#[derive(Debug, Serialize)]
pub(crate) struct ConfigInput {
    pub(crate) updates: UpdateInput,
    pub(crate) casync: CasyncInput,
    pub(crate) channels: Vec<ChannelInput>,
    pub(crate) paths: PathsInput,
    pub(crate) staging: StagingInput,
}

impl ConfigInput {
    /// Read config snippets and merge them into a single config.
    pub(crate) fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let mut snips = vec![];
        for path in snippet_paths(dirs)? {
            trace!("reading config snippet from {:?}", path);
            let content = std::fs::read_to_string(&path)
                .context(format!("failed to read file '{}'", path.display()))?;
            let snippet: snippets::ConfigSnippet = toml::from_str(&content)
                .context(format!("failed to parse TOML in '{}'", path.display()))?;
            snips.push(snippet);
        }

        let cfg = Self::merge_snippets(snips);
        debug!(
            "Configuration input:\n{}",
            toml::to_string_pretty(&cfg).unwrap_or_default()
        );

        Ok(cfg)
    }

    /// Merge multiple snippets into a single configuration.
    pub(crate) fn merge_snippets(snippets: Vec<snippets::ConfigSnippet>) -> Self {
        let mut updates = vec![];
        let mut casyncs = vec![];
        let mut channel_tables = vec![];
        let mut paths = vec![];
        let mut stagings = vec![];

        for snip in snippets {
            if let Some(u) = snip.updates {
                updates.push(u);
            }
            if let Some(c) = snip.casync {
                casyncs.push(c);
            }
            if let Some(t) = snip.channels {
                channel_tables.push(t);
            }
            if let Some(p) = snip.paths {
                paths.push(p);
            }
            if let Some(s) = snip.staging {
                stagings.push(s);
            }
        }

        Self {
            updates: UpdateInput::from_snippets(updates),
            casync: CasyncInput::from_snippets(casyncs),
            channels: ChannelInput::from_tables(channel_tables),
            paths: PathsInput::from_snippets(paths),
            staging: StagingInput::from_snippets(stagings),
        }
    }
}

/// List snippet files, directory by directory, in lexical order.
fn snippet_paths(dirs: &[PathBuf]) -> Fallible<Vec<PathBuf>> {
    let mut all = vec![];
    for dir in dirs {
        let snip_dir = dir.join(SNIPPETS_DIR);
        if !snip_dir.is_dir() {
            trace!("skipping missing config directory {:?}", snip_dir);
            continue;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(&snip_dir)
            .context(format!("failed to list '{}'", snip_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_toml(p))
            .collect();
        found.sort();
        all.extend(found);
    }
    Ok(all)
}

fn is_toml(path: &Path) -> bool {
    path.is_file() && path.extension().map_or(false, |ext| ext == "toml")
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateInput {
    pub(crate) strategy: String,
    pub(crate) channel: String,
    pub(crate) refresh_period_secs: u64,
}

impl UpdateInput {
    fn from_snippets(snippets: Vec<snippets::UpdateSnippet>) -> Self {
        let mut cfg = Self {
            strategy: String::new(),
            channel: String::new(),
            refresh_period_secs: 60,
        };

        for snip in snippets {
            if let Some(s) = snip.strategy {
                cfg.strategy = s;
            }
            if let Some(c) = snip.channel {
                cfg.channel = c;
            }
            if let Some(r) = snip.refresh_period_secs {
                cfg.refresh_period_secs = r;
            }
        }

        cfg
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CasyncInput {
    pub(crate) base_url: String,
    pub(crate) binary: String,
    pub(crate) without: String,
    pub(crate) exclude: Vec<String>,
}

impl CasyncInput {
    fn from_snippets(snippets: Vec<snippets::CasyncSnippet>) -> Self {
        let mut cfg = Self {
            base_url: String::new(),
            binary: String::new(),
            without: String::new(),
            exclude: vec![],
        };

        for snip in snippets {
            if let Some(u) = snip.base_url {
                cfg.base_url = u;
            }
            if let Some(b) = snip.binary {
                cfg.binary = b;
            }
            if let Some(w) = snip.without {
                cfg.without = w;
            }
            if let Some(x) = snip.exclude {
                cfg.exclude = x;
            }
        }

        cfg
    }
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct ChannelInput {
    pub(crate) name: String,
    pub(crate) remote: String,
}

impl ChannelInput {
    /// Last table wins; defaults apply when no snippet has one.
    fn from_tables(tables: Vec<Vec<snippets::ChannelSnippet>>) -> Vec<Self> {
        match tables.into_iter().last() {
            Some(table) => table
                .into_iter()
                .map(|c| Self {
                    name: c.name,
                    remote: c.remote,
                })
                .collect(),
            None => DEFAULT_CHANNELS
                .iter()
                .map(|(name, remote)| Self {
                    name: name.to_string(),
                    remote: remote.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PathsInput {
    pub(crate) running: String,
    pub(crate) staging_root: String,
    pub(crate) finalized: String,
    pub(crate) consistent_flag: String,
}

impl PathsInput {
    fn from_snippets(snippets: Vec<snippets::PathsSnippet>) -> Self {
        let mut cfg = Self {
            running: String::new(),
            staging_root: String::new(),
            finalized: String::new(),
            consistent_flag: String::new(),
        };

        for snip in snippets {
            if let Some(r) = snip.running {
                cfg.running = r;
            }
            if let Some(s) = snip.staging_root {
                cfg.staging_root = s;
            }
            if let Some(f) = snip.finalized {
                cfg.finalized = f;
            }
            if let Some(c) = snip.consistent_flag {
                cfg.consistent_flag = c;
            }
        }

        cfg
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StagingInput {
    pub(crate) privileged_removal: bool,
}

impl StagingInput {
    fn from_snippets(snippets: Vec<snippets::StagingSnippet>) -> Self {
        let mut cfg = Self {
            privileged_removal: true,
        };

        for snip in snippets {
            if let Some(p) = snip.privileged_removal {
                cfg.privileged_removal = p;
            }
        }

        cfg
    }
}
