//! casync-updater: content-addressable sync update agent.
//!
//! This binary prepares system updates for embedded devices.
//! New images are fetched with an external content-addressable
//! sync tool into a staging tree, verified against the digest
//! published for the target channel, and copied into a finalized
//! tree that an external activation step swaps in.
//!
//! Each lifecycle step is exposed as a one-shot subcommand for an
//! external scheduler. The `agent` subcommand instead runs:
//!  * `UpdateAgent` - polling state-machine, driving the configured update strategy.

extern crate env_logger;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
extern crate reqwest;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate structopt;

mod channels;
mod config;
mod digest;
mod errors;
mod flag;
mod metadata;
mod staging;
mod strategy;
mod tree;
mod update_agent;

#[cfg(test)]
mod testutil;

use crate::config::AgentConfig;
use crate::strategy::UpdateStrategy;
use crate::update_agent::UpdateAgent;
use actix::prelude::*;
use failure::Fallible;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "casync-updater")]
struct CliOptions {
    /// Verbosity level (higher is more verbose).
    #[structopt(short = "v", parse(from_occurrences))]
    verbosity: u64,

    /// Configuration directory (repeatable, replaces the default set).
    #[structopt(long = "config-dir", parse(from_os_str))]
    config_dirs: Vec<PathBuf>,

    #[structopt(subcommand)]
    cmd: CliCommand,
}

#[derive(Debug, StructOpt)]
enum CliCommand {
    /// Run the polling update agent.
    #[structopt(name = "agent")]
    Agent {},
    /// Reset the staging tree.
    #[structopt(name = "init")]
    Init {},
    /// List available channels.
    #[structopt(name = "channels")]
    Channels {},
    /// Check whether an update is available.
    #[structopt(name = "check")]
    Check {},
    /// Fetch the target channel into staging.
    #[structopt(name = "fetch")]
    Fetch {},
    /// Finalize the staged update.
    #[structopt(name = "finalize")]
    Finalize {},
    /// Check whether a finalized update is ready.
    #[structopt(name = "ready")]
    Ready {},
    /// Describe running and prepared systems, as JSON.
    #[structopt(name = "status")]
    Status {},
}

/// Status report for the `status` subcommand.
#[derive(Debug, Serialize)]
struct StatusReport {
    strategy: String,
    channels: Vec<String>,
    target_channel: String,
    current_channel: String,
    current: Description,
    ready: Description,
}

#[derive(Debug, Serialize)]
struct Description {
    label: String,
    release_notes: String,
}

impl From<(String, String)> for Description {
    fn from((label, release_notes): (String, String)) -> Self {
        Self {
            label,
            release_notes,
        }
    }
}

fn main() -> Fallible<()> {
    let opts = CliOptions::from_args();
    init_logging(opts.verbosity)?;

    let dirs = if opts.config_dirs.is_empty() {
        config::DEFAULT_CONFIG_DIRS
            .iter()
            .map(PathBuf::from)
            .collect()
    } else {
        opts.config_dirs.clone()
    };
    let cfg = AgentConfig::read_config(&dirs)?;
    let strategy = strategy::try_from_config(&cfg)?;

    match opts.cmd {
        CliCommand::Agent {} => run_agent(cfg, strategy),
        CliCommand::Init {} => strategy.init(),
        CliCommand::Channels {} => {
            for name in strategy.available_channels() {
                println!("{}", name);
            }
            Ok(())
        }
        CliCommand::Check {} => {
            println!("{}", strategy.update_available()?);
            Ok(())
        }
        CliCommand::Fetch {} => strategy.fetch_update(),
        CliCommand::Finalize {} => {
            strategy.finalize_update()?;
            strategy.cleanup()
        }
        CliCommand::Ready {} => {
            println!("{}", strategy.update_ready()?);
            Ok(())
        }
        CliCommand::Status {} => {
            let report = status_report(strategy.as_ref());
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_logging(verbosity: u64) -> Fallible<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(level);
    }
    builder.try_init()?;
    Ok(())
}

fn status_report(strategy: &dyn UpdateStrategy) -> StatusReport {
    StatusReport {
        strategy: strategy.name().to_string(),
        channels: strategy.available_channels(),
        target_channel: strategy.target_channel().to_string(),
        current_channel: strategy.current_channel(),
        current: strategy.describe_current_channel().into(),
        ready: strategy.describe_ready_channel().into(),
    }
}

fn run_agent(cfg: AgentConfig, strategy: Box<dyn UpdateStrategy>) -> Fallible<()> {
    info!("starting update agent");
    let agent = UpdateAgent::new(strategy, cfg.refresh_period);

    let sys = actix::System::new("casync-updater");

    // Start update agent in its own thread and event loop.
    let agent_arbiter = Arbiter::builder()
        .name("update_agent")
        .stop_system_on_panic(true)
        .build();
    let _agent_addr = Supervisor::start_in_arbiter(&agent_arbiter, move |_| agent);

    sys.run();
    Ok(())
}
