use crate::pfsense::console::PfSsh;
use crate::pfsense::report::ExecutionOutcome;
use crate::pfsense::rule::{RuleIntent, RuleMachine};
use crate::utils::{config::AgentConfig, error::AgentError, tools::read_params};
use clap::ArgMatches;
use log::error;

pub fn main(
    cmd: &ArgMatches,
    config: &AgentConfig,
    check_mode: bool,
) -> Result<ExecutionOutcome, AgentError> {
    let params = read_params(cmd.get_one::<String>("params"))?;
    let intent = RuleIntent::from_params(&params).map_err(|e| {
        error!("Rejected rule params {}: {}", params, e);
        e
    })?;
    let console = PfSsh::from_config(config);
    RuleMachine::new(&console, check_mode).apply(&intent)
}
