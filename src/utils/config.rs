use crate::utils::error::AgentError;
use serde::{Deserialize, Serialize};
use simplelog::LevelFilter;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONSOLE: &str = "/usr/local/sbin/pfSsh.php";
pub const DEFAULT_CACHE_FILE: &str = "/tmp/config.cache";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Agent settings, read from a JSON file. Every field may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub console: PathBuf,
    pub console_args: Vec<String>,
    pub cache_file: PathBuf,
    /// Zero disables the limit.
    pub timeout_secs: u64,
    pub detect_changes: bool,
    pub lock_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            console: PathBuf::from(DEFAULT_CONSOLE),
            console_args: Vec::new(),
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            detect_changes: false,
            lock_file: None,
            log_dir: None,
            log_level: String::from("info"),
        }
    }
}

impl AgentConfig {
    pub fn load(path: Option<&String>) -> Result<AgentConfig, AgentError> {
        let file_path = match path {
            Some(path) => path,
            None => return Ok(AgentConfig::default()),
        };
        let file = File::open(file_path)
            .map_err(|e| AgentError::Config(format!("{}: {}", file_path, e)))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| AgentError::Config(format!("{}: {}", file_path, e)))
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn log_level(&self) -> Result<LevelFilter, AgentError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| AgentError::Config(format!("unknown log_level {}", self.log_level)))
    }
}
