use clap::{App, Arg, ArgMatches, SubCommand};

use chrono::prelude::*;
use log::{error, warn};
use simplelog::*;

use std::fs::File;
use std::process;

pub mod commands;
pub mod pfsense;
pub mod utils;

use pfsense::report::ExecutionOutcome;
use utils::{
    config::AgentConfig,
    error::AgentError,
    tools::{emit, FailureDocument},
};

fn cli() -> App<'static> {
    let params = Arg::with_name("params")
        .short('p')
        .long("params")
        .takes_value(true)
        .help("JSON parameter document, '-' or omitted for stdin");
    App::new("pfconf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Applies declarative configuration intents to a pfSense appliance")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::with_name("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .global(true)
                .help("Agent configuration file"),
        )
        .arg(
            Arg::with_name("check")
                .long("check")
                .global(true)
                .help("Compose the session script without running it"),
        )
        .subcommand(
            SubCommand::with_name("generic")
                .about("Set hostname, domain, dns, ntptimeserver or timezone")
                .arg(params.clone()),
        )
        .subcommand(
            SubCommand::with_name("rule")
                .about("Declare a firewall rule present or absent (filter reload only)")
                .arg(params),
        )
}

fn init_logging(subcommand: &str, config: &AgentConfig) -> Result<(), AgentError> {
    let level = config.log_level()?;
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(dir) = &config.log_dir {
        let dt = Local::now();
        let path = dir.join(format!(
            "pfconf_{}_{}.log",
            subcommand,
            dt.format("%Y_%m_%d_%H_%M_%S")
        ));
        let file = File::create(&path)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?;
        loggers.push(WriteLogger::new(level, Config::default(), file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn run(app: &ArgMatches) -> Result<ExecutionOutcome, AgentError> {
    let check_mode = app.is_present("check");
    let config = AgentConfig::load(app.get_one::<String>("config"))?;
    match app.subcommand() {
        Some(("generic", cmd)) => {
            init_logging("generic", &config)?;
            commands::generic::main(cmd, &config, check_mode)
        }
        Some(("rule", cmd)) => {
            init_logging("rule", &config)?;
            commands::rule::main(cmd, &config, check_mode)
        }
        Some((x, _)) => Err(AgentError::Validation(format!("unknown command: {}", x))),
        None => Err(AgentError::Validation(String::from("no command provided"))),
    }
}

fn main() {
    let app = cli().get_matches();
    match run(&app) {
        Ok(outcome) => emit(&outcome),
        Err(e) => {
            if e.is_validation() {
                warn!("Rejected before contacting the appliance: {}", e);
            } else {
                error!("{}", e);
            }
            emit(&FailureDocument::new(&e));
            process::exit(1);
        }
    }
}
