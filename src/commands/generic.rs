use crate::pfsense::console::PfSsh;
use crate::pfsense::generic::{OptionIntent, OptionRouter};
use crate::pfsense::report::ExecutionOutcome;
use crate::utils::{config::AgentConfig, error::AgentError, tools::read_params};
use clap::ArgMatches;
use log::error;

pub fn main(
    cmd: &ArgMatches,
    config: &AgentConfig,
    check_mode: bool,
) -> Result<ExecutionOutcome, AgentError> {
    let params = read_params(cmd.get_one::<String>("params"))?;
    let intent = OptionIntent::from_params(&params).map_err(|e| {
        error!("Rejected generic params {}: {}", params, e);
        e
    })?;
    let console = PfSsh::from_config(config);
    OptionRouter::new(&console, config, check_mode)?.route(&intent)
}
