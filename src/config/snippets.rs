/// Top-level configuration stanza.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigSnippet {
    /// Update logic configuration.
    pub(crate) updates: Option<UpdateSnippet>,
    /// Sync tool and remote channel directory.
    pub(crate) casync: Option<CasyncSnippet>,
    /// Channel table, replaces any earlier one.
    pub(crate) channels: Option<Vec<ChannelSnippet>>,
    /// Filesystem locations.
    pub(crate) paths: Option<PathsSnippet>,
    /// Staging area handling.
    pub(crate) staging: Option<StagingSnippet>,
}

/// Config snippet for update logic.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateSnippet {
    /// Update strategy (default: casync)
    pub(crate) strategy: Option<String>,
    /// Target channel (default: current channel, if known)
    pub(crate) channel: Option<String>,
    /// Agent polling period, in seconds (default: 60)
    pub(crate) refresh_period_secs: Option<u64>,
}

/// Config snippet for the sync tool.
#[derive(Debug, Deserialize)]
pub(crate) struct CasyncSnippet {
    /// Base URL of the remote channel directory.
    pub(crate) base_url: Option<String>,
    /// Sync tool executable (default: casync)
    pub(crate) binary: Option<String>,
    /// Metadata features excluded from digests (default: all)
    pub(crate) without: Option<String>,
    /// Volatile paths that releases must exclude from digests,
    /// besides the channel record.
    pub(crate) exclude: Option<Vec<String>>,
}

/// Single channel table entry.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ChannelSnippet {
    pub(crate) name: String,
    pub(crate) remote: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathsSnippet {
    /// Running system tree.
    pub(crate) running: Option<String>,
    pub(crate) staging_root: Option<String>,
    pub(crate) finalized: Option<String>,
    /// Consistency flag marker, outside both trees.
    pub(crate) consistent_flag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StagingSnippet {
    /// Try `sudo rm -rf` on the staging root first (default: true)
    pub(crate) privileged_removal: Option<bool>,
}
