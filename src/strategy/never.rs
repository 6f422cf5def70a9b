use super::{UpdateStrategy, UNKNOWN_CHANNEL};
use crate::channels::ChannelRegistry;
use crate::config::AgentConfig;
use failure::Fallible;

/// Strategy with updates disabled.
#[derive(Clone, Debug)]
pub(crate) struct StratNever {
    channels: ChannelRegistry,
    target: String,
}

impl StratNever {
    pub(crate) fn new(cfg: &AgentConfig) -> Self {
        let target = cfg
            .target_channel
            .clone()
            .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
        Self {
            channels: cfg.channels.clone(),
            target,
        }
    }
}

impl UpdateStrategy for StratNever {
    fn name(&self) -> &'static str {
        "never"
    }

    fn init(&self) -> Fallible<()> {
        trace!("init, strategy 'never'");
        Ok(())
    }

    fn available_channels(&self) -> Vec<String> {
        self.channels.available_channels()
    }

    fn target_channel(&self) -> &str {
        &self.target
    }

    fn current_channel(&self) -> String {
        UNKNOWN_CHANNEL.to_string()
    }

    fn update_available(&self) -> Fallible<bool> {
        trace!("update check, strategy 'never'");
        Ok(false)
    }

    fn update_ready(&self) -> Fallible<bool> {
        Ok(false)
    }

    fn fetch_update(&self) -> Fallible<()> {
        bail!("updates are disabled, refusing to fetch")
    }

    fn finalize_update(&self) -> Fallible<()> {
        bail!("updates are disabled, refusing to finalize")
    }

    fn describe_current_channel(&self) -> (String, String) {
        (String::new(), String::new())
    }

    fn describe_ready_channel(&self) -> (String, String) {
        (String::new(), String::new())
    }

    fn cleanup(&self) -> Fallible<()> {
        Ok(())
    }
}
