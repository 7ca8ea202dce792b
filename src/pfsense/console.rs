use crate::pfsense::script::SessionScript;
use crate::utils::config::AgentConfig;
use crate::utils::error::{AgentError, ExecCause};
use crate::utils::tools::SessionLock;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use subprocess::{ExitStatus, Popen, PopenConfig, Redirection};

/// What came back from one console session, before any normalisation.
#[derive(Debug, Clone)]
pub struct RawExecution {
    pub exit_code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
}

/// Something that can run a [`SessionScript`] to completion.
pub trait Console {
    /// Name reported as `cmd` in outcomes.
    fn command(&self) -> String;
    fn execute(&self, script: &SessionScript) -> Result<RawExecution, AgentError>;
}

/// The appliance's pfSsh.php shell, fed the script on stdin.
pub struct PfSsh {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
    lock_file: Option<PathBuf>,
}

impl PfSsh {
    pub fn new(program: PathBuf) -> PfSsh {
        PfSsh {
            program,
            args: Vec::new(),
            timeout: None,
            lock_file: None,
        }
    }

    pub fn from_config(config: &AgentConfig) -> PfSsh {
        PfSsh::new(config.console.clone())
            .args(config.console_args.as_slice())
            .timeout(config.timeout())
            .lock_file(config.lock_file.clone())
    }

    pub fn args<S: AsRef<str>>(mut self, args: &[S]) -> PfSsh {
        self.args = args.iter().map(|a| a.as_ref().to_owned()).collect();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> PfSsh {
        self.timeout = timeout;
        self
    }

    pub fn lock_file(mut self, lock_file: Option<PathBuf>) -> PfSsh {
        self.lock_file = lock_file;
        self
    }

    fn argv(&self) -> Vec<OsString> {
        let mut argv = vec![self.program.clone().into_os_string()];
        argv.extend(self.args.iter().map(OsString::from));
        argv
    }

    fn kill(&self, p: &mut Popen) {
        if let Err(e) = p.kill() {
            warn!("Failed to kill {}: {}", self.command(), e);
        }
        if let Err(e) = p.wait() {
            warn!("Failed to reap {}: {}", self.command(), e);
        }
    }
}

impl Console for PfSsh {
    fn command(&self) -> String {
        self.program.display().to_string()
    }

    fn execute(&self, script: &SessionScript) -> Result<RawExecution, AgentError> {
        let _lock = match &self.lock_file {
            Some(path) => Some(SessionLock::acquire(path)?),
            None => None,
        };

        info!(
            "Launching {} with {} statements (sha1 {})",
            self.command(),
            script.statements().len(),
            script.digest()
        );
        debug!("Session script:\n{}", script.render());

        let started_at = Local::now();
        let clock = Instant::now();
        let argv = self.argv();
        let mut p = Popen::create(
            argv.as_slice(),
            PopenConfig {
                stdin: Redirection::Pipe,
                stdout: Redirection::Pipe,
                stderr: Redirection::Pipe,
                ..Default::default()
            },
        )
        .map_err(|source| ExecCause::Spawn {
            console: self.command(),
            source,
        })?;

        let mut communicator = p.communicate_start(Some(script.render().into_bytes()));
        if let Some(limit) = self.timeout {
            communicator = communicator.limit_time(limit);
        }
        let (stdout, stderr) = match communicator.read_string() {
            Ok(streams) => streams,
            Err(e) => {
                self.kill(&mut p);
                return Err(match (e.error.kind(), self.timeout) {
                    (io::ErrorKind::TimedOut, Some(limit)) => {
                        error!("{} did not finish within {:?}", self.command(), limit);
                        ExecCause::Timeout(limit)
                    }
                    _ => ExecCause::Io(e.error),
                }
                .into());
            }
        };

        // Streams are closed, the process may still be winding down.
        let status = match self.timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(clock.elapsed());
                match p.wait_timeout(remaining).map_err(ExecCause::Wait)? {
                    Some(status) => status,
                    None => {
                        self.kill(&mut p);
                        error!("{} did not exit within {:?}", self.command(), limit);
                        return Err(ExecCause::Timeout(limit).into());
                    }
                }
            }
            None => p.wait().map_err(ExecCause::Wait)?,
        };
        let ended_at = Local::now();

        let exit_code = exit_code(status);
        if exit_code == 0 {
            info!("{} exited 0 after {:?}", self.command(), clock.elapsed());
        } else {
            warn!(
                "{} exited {} after {:?}",
                self.command(),
                exit_code,
                clock.elapsed()
            );
        }

        Ok(RawExecution {
            exit_code,
            stdout,
            stderr,
            started_at,
            ended_at,
        })
    }
}

/// Signals are reported negated, the way a shell wrapper would.
fn exit_code(status: ExitStatus) -> i32 {
    match status {
        ExitStatus::Exited(code) => code as i32,
        ExitStatus::Signaled(signal) => -(signal as i32),
        ExitStatus::Other(code) => code,
        ExitStatus::Undetermined => -1,
    }
}
