//! Update agent.

use crate::errors::{self, UpdateError};
use crate::strategy::UpdateStrategy;
use actix::prelude::*;
use failure::{Error, Fallible};
use std::time;

/// Lifecycle states of an update cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateState {
    /// Waiting for the next availability check.
    Idle,
    /// Comparing local and remote digests.
    Checking,
    /// Downloading into staging.
    Fetching,
    /// Staging holds the target channel content.
    Fetched,
    /// Copying staging into the finalized tree.
    Finalizing,
    /// Finalized tree is consistent and awaits activation.
    Ready,
}

#[derive(Debug)]
pub(crate) struct UpdateAgent {
    pub(crate) refresh_period: time::Duration,
    pub(crate) strategy: Box<dyn UpdateStrategy>,
    pub(crate) state: UpdateState,
    /// Staging must be reset before the next cycle.
    pub(crate) needs_init: bool,
}

impl Actor for UpdateAgent {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        trace!("update agent started");

        // Schedule periodical refresh.
        ctx.notify(RefreshTick {});
        ctx.run_interval(self.refresh_period, |_act, ctx| ctx.notify(RefreshTick {}));
    }
}

impl Supervised for UpdateAgent {}

pub(crate) struct RefreshTick {}

impl Message for RefreshTick {
    type Result = Result<(), Error>;
}

impl Handler<RefreshTick> for UpdateAgent {
    type Result = Result<(), Error>;

    fn handle(&mut self, _msg: RefreshTick, _ctx: &mut Self::Context) -> Self::Result {
        trace!("update agent tick, current state: {:?}", self.state);
        self.step()
    }
}

impl UpdateAgent {
    pub(crate) fn new(strategy: Box<dyn UpdateStrategy>, refresh_period: time::Duration) -> Self {
        Self {
            refresh_period,
            strategy,
            state: UpdateState::Idle,
            needs_init: true,
        }
    }

    /// Run one scheduling step.
    ///
    /// A failed step aborts the current cycle: the agent goes back to
    /// `Idle` and resets staging before trying again.
    pub(crate) fn step(&mut self) -> Fallible<()> {
        let result = self.advance();
        if let Err(ref e) = result {
            match errors::kind_of(e) {
                Some(UpdateError::Network(_)) => {
                    warn!("update cycle aborted while {:?}: {}", self.state, e)
                }
                _ => error!("update cycle aborted while {:?}: {}", self.state, e),
            }
            self.state = UpdateState::Idle;
            self.needs_init = true;
        }
        result
    }

    fn advance(&mut self) -> Fallible<()> {
        if self.needs_init {
            self.strategy.init()?;
            self.needs_init = false;
        }

        loop {
            match self.state {
                UpdateState::Idle => self.transition(UpdateState::Checking),
                UpdateState::Checking => {
                    if self.strategy.update_available()? {
                        self.transition(UpdateState::Fetching);
                    } else if self.strategy.update_ready()? {
                        self.transition(UpdateState::Ready);
                        return Ok(());
                    } else {
                        self.transition(UpdateState::Idle);
                        return Ok(());
                    }
                }
                UpdateState::Fetching => {
                    self.strategy.fetch_update()?;
                    self.transition(UpdateState::Fetched);
                }
                UpdateState::Fetched => self.transition(UpdateState::Finalizing),
                UpdateState::Finalizing => {
                    self.strategy.finalize_update()?;
                    self.strategy.cleanup()?;
                    self.transition(UpdateState::Ready);
                    let (label, _) = self.strategy.describe_ready_channel();
                    info!("update ready for activation: {}", label);
                    return Ok(());
                }
                UpdateState::Ready => {
                    if !self.strategy.update_ready()? {
                        info!("prepared update is stale, starting a new cycle");
                        self.needs_init = true;
                        self.transition(UpdateState::Idle);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn transition(&mut self, next: UpdateState) {
        debug!("update agent: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
