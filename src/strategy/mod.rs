//! Update strategies.
//!
//! An update strategy knows how to detect, fetch and finalize new
//! system images. The implementation is picked at startup from
//! configuration and driven by an external scheduler (or by the
//! update agent), one step at a time.

use crate::config::AgentConfig;
use crate::digest::CasyncTool;
use failure::Fallible;
use std::fmt;

mod casync;
pub(crate) use casync::StratCasync;

mod never;
pub(crate) use never::StratNever;

/// Channel name reported when no source knows better.
pub(crate) static UNKNOWN_CHANNEL: &str = "unknown";

/// Shared contract of all update mechanisms.
pub(crate) trait UpdateStrategy: Send + fmt::Debug {
    /// Strategy name, as used in configuration.
    fn name(&self) -> &'static str;

    /// Reset the staging area for a new update cycle.
    fn init(&self) -> Fallible<()>;

    /// Channels this strategy can follow, in configuration order.
    fn available_channels(&self) -> Vec<String>;

    /// Channel updates are fetched from.
    fn target_channel(&self) -> &str;

    /// Best-known channel of the running system.
    fn current_channel(&self) -> String;

    /// Whether the target channel differs from what is running or prepared.
    fn update_available(&self) -> Fallible<bool>;

    /// Whether a finalized update is consistent and matches the target channel.
    fn update_ready(&self) -> Fallible<bool>;

    /// Download the target channel into staging.
    fn fetch_update(&self) -> Fallible<()>;

    /// Turn the staged update into the activatable finalized tree.
    fn finalize_update(&self) -> Fallible<()>;

    /// Version label and release notes of the running system.
    fn describe_current_channel(&self) -> (String, String);

    /// Version label and release notes of the prepared update, if ready.
    fn describe_ready_channel(&self) -> (String, String);

    /// Post-finalize cleanup.
    fn cleanup(&self) -> Fallible<()>;
}

/// Build the configured update strategy.
pub(crate) fn try_from_config(cfg: &AgentConfig) -> Fallible<Box<dyn UpdateStrategy>> {
    let strategy: Box<dyn UpdateStrategy> = match cfg.strategy.as_ref() {
        "casync" => {
            let tool = CasyncTool {
                binary: cfg.binary.clone(),
                without: cfg.without.clone(),
            };
            Box::new(StratCasync::new(cfg, Box::new(tool))?)
        }
        "never" => Box::new(StratNever::new(cfg)),
        x => bail!("unsupported strategy '{}'", x),
    };
    info!(
        "update strategy '{}', target channel '{}'",
        strategy.name(),
        strategy.target_channel()
    );
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigInput;

    fn config(strategy: &str, tmp: &std::path::Path) -> AgentConfig {
        let mut input = ConfigInput::merge_snippets(vec![]);
        input.updates.strategy = strategy.to_string();
        input.updates.channel = "master-ci".to_string();
        input.paths.running = tmp.join("running").display().to_string();
        input.paths.staging_root = tmp.join("staging").display().to_string();
        input.paths.finalized = tmp.join("finalized").display().to_string();
        input.paths.consistent_flag = tmp.join("consistent").display().to_string();
        AgentConfig::try_from_input(input).unwrap()
    }

    #[test]
    fn selects_by_name() {
        let tmp = tempfile::tempdir().unwrap();

        let casync = try_from_config(&config("casync", tmp.path())).unwrap();
        assert_eq!(casync.name(), "casync");
        assert_eq!(casync.target_channel(), "master-ci");

        let never = try_from_config(&config("never", tmp.path())).unwrap();
        assert_eq!(never.name(), "never");
        assert!(!never.update_available().unwrap());
    }

    #[test]
    fn rejects_unknown_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(try_from_config(&config("git", tmp.path())).is_err());
    }
}
