use crate::pfsense::console::RawExecution;
use crate::pfsense::script::SessionScript;
use chrono::{DateTime, Duration, Local};
use serde::{Serialize, Serializer};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Result document handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub cmd: String,
    pub stdout: String,
    pub stderr: String,
    pub rc: i32,
    #[serde(serialize_with = "timestamp")]
    pub start: DateTime<Local>,
    #[serde(serialize_with = "timestamp")]
    pub end: DateTime<Local>,
    #[serde(serialize_with = "elapsed")]
    pub delta: Duration,
    pub changed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub check_mode: bool,
}

impl ExecutionOutcome {
    /// An outcome for work that launched nothing.
    pub fn without_session(cmd: &str, stdout: String) -> ExecutionOutcome {
        let now = Local::now();
        ExecutionOutcome {
            cmd: cmd.to_owned(),
            stdout,
            stderr: String::new(),
            rc: 0,
            start: now,
            end: now,
            delta: Duration::zero(),
            changed: true,
            warnings: Vec::new(),
            check_mode: false,
        }
    }

    /// Check mode: the script that would have been run, reported on stdout.
    pub fn planned(cmd: &str, script: &SessionScript) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::without_session(cmd, trim_line_endings(script.render()));
        outcome.check_mode = true;
        outcome
    }

    pub fn changed(mut self, changed: bool) -> ExecutionOutcome {
        self.changed = changed;
        self
    }

    pub fn warn(mut self, warning: &str) -> ExecutionOutcome {
        self.warnings.push(warning.to_owned());
        self
    }
}

/// Normalises a raw session. `changed` is always true here: the write is issued whether
/// or not the value differed.
pub fn report(raw: RawExecution, command: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        cmd: command.to_owned(),
        stdout: trim_line_endings(raw.stdout.unwrap_or_default()),
        stderr: trim_line_endings(raw.stderr.unwrap_or_default()),
        rc: raw.exit_code,
        start: raw.started_at,
        end: raw.ended_at,
        delta: raw.ended_at - raw.started_at,
        changed: true,
        warnings: Vec::new(),
        check_mode: false,
    }
}

fn trim_line_endings(mut s: String) -> String {
    let len = s.trim_end_matches(|c| c == '\r' || c == '\n').len();
    s.truncate(len);
    s
}

fn timestamp<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

fn elapsed<S: Serializer>(delta: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_delta(*delta))
}

/// `H:MM:SS.ffffff`, negative spans clamp to zero.
pub fn format_delta(delta: Duration) -> String {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX).max(0);
    let secs = micros / 1_000_000;
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        micros % 1_000_000
    )
}
