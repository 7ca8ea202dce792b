use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::SetLoggerError;
use thiserror::Error;

/// Why a console session could not produce an outcome.
#[derive(Debug, Error)]
pub enum ExecCause {
    #[error("failed to launch {console}: {source}")]
    Spawn {
        console: String,
        #[source]
        source: subprocess::PopenError,
    },
    #[error("failed waiting on console: {0}")]
    Wait(#[source] subprocess::PopenError),
    #[error("i/o error talking to console: {0}")]
    Io(#[from] io::Error),
    #[error("timeout after {}s, console killed", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("lock {} is held by another session", .0.display())]
    Locked(PathBuf),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Incorrect params: {0}")]
    Validation(String),
    #[error("Value for {option} is not {expected} (got {observed})")]
    TypeMismatch {
        option: &'static str,
        expected: &'static str,
        observed: String,
    },
    #[error("Console session failed: {0}")]
    Execution(#[from] ExecCause),
    #[error("Bad configuration: {0}")]
    Config(String),
    #[error("Could not read params: {0}")]
    Params(String),
    #[error("Could not start logging: {0}")]
    Logging(#[from] SetLoggerError),
}

impl AgentError {
    /// True for failures raised before anything was sent to the appliance.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AgentError::Validation(_) | AgentError::TypeMismatch { .. } | AgentError::Params(_)
        )
    }
}
