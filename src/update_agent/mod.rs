//! Update agent state-machine.

mod agent;

pub(crate) use agent::UpdateAgent;
