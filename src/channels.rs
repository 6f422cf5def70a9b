//! Channel registry.
//!
//! Immutable lookup table from user-facing channel names to the
//! identifiers used for remote resources. It is built once from
//! configuration and never mutated afterwards.

use crate::errors::UpdateError;
use failure::Fallible;
use itertools::Itertools;

/// Built-in channel table, used when no snippet defines one.
pub(crate) static DEFAULT_CHANNELS: &[(&str, &str)] =
    &[("release3", "release"), ("master-ci", "master-ci")];

/// A single update channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct Channel {
    /// User-facing name (e.g. `release3`).
    pub(crate) name: String,
    /// Remote sync identifier (e.g. `release`).
    pub(crate) remote: String,
}

/// Ordered table of configured channels.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Build a registry, rejecting empty or duplicate names.
    pub(crate) fn try_new(channels: Vec<Channel>) -> Fallible<Self> {
        if channels.is_empty() {
            bail!("no update channels configured");
        }
        if let Some(c) = channels.iter().find(|c| c.name.is_empty() || c.remote.is_empty()) {
            bail!("invalid channel entry '{}' -> '{}'", c.name, c.remote);
        }
        let unique = channels.iter().map(|c| c.name.as_str()).unique().count();
        if unique != channels.len() {
            bail!(
                "duplicate channel names in table: {}",
                channels.iter().map(|c| c.name.as_str()).join(", ")
            );
        }

        Ok(Self { channels })
    }

    /// Names of all channels, in configuration order.
    pub(crate) fn available_channels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a channel by its user-facing name.
    pub(crate) fn get(&self, name: &str) -> Fallible<&Channel> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| UpdateError::UnknownChannel(name.to_string()).into())
    }

    /// Resolve a channel name to its remote identifier.
    pub(crate) fn resolve(&self, name: &str) -> Fallible<&str> {
        self.get(name).map(|c| c.remote.as_str())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.name == name)
    }

    pub(crate) fn first(&self) -> &Channel {
        // Non-emptiness is checked at construction.
        &self.channels[0]
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let channels = DEFAULT_CHANNELS
            .iter()
            .map(|(name, remote)| Channel {
                name: name.to_string(),
                remote: remote.to_string(),
            })
            .collect();
        Self { channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{kind_of, UpdateError};

    fn chan(name: &str, remote: &str) -> Channel {
        Channel {
            name: name.to_string(),
            remote: remote.to_string(),
        }
    }

    #[test]
    fn default_table_order() {
        let reg = ChannelRegistry::default();
        assert_eq!(reg.available_channels(), vec!["release3", "master-ci"]);
        assert_eq!(reg.resolve("release3").unwrap(), "release");
        assert_eq!(reg.resolve("master-ci").unwrap(), "master-ci");
        assert_eq!(reg.first().name, "release3");
    }

    #[test]
    fn configured_order_is_kept() {
        let reg = ChannelRegistry::try_new(vec![
            chan("zeta", "z"),
            chan("alpha", "a"),
            chan("mid", "m"),
        ])
        .unwrap();
        assert_eq!(reg.available_channels(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn unknown_channel() {
        let reg = ChannelRegistry::default();
        let err = reg.resolve("nightly").unwrap_err();
        match kind_of(&err) {
            Some(UpdateError::UnknownChannel(name)) => assert_eq!(name, "nightly"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!reg.contains("nightly"));
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(ChannelRegistry::try_new(vec![]).is_err());
        assert!(ChannelRegistry::try_new(vec![chan("", "x")]).is_err());
        assert!(ChannelRegistry::try_new(vec![chan("a", "")]).is_err());
        assert!(ChannelRegistry::try_new(vec![chan("a", "x"), chan("a", "y")]).is_err());
    }
}
