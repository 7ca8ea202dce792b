use crate::utils::error::{AgentError, ExecCause};
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, stdin, BufReader, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Reads the JSON parameter document from `path`, or stdin for `-` / `None`.
pub fn read_params(path: Option<&String>) -> Result<Value, AgentError> {
    match path.map(String::as_str) {
        None | Some("-") => parse_params(stdin().lock()),
        Some(file_path) => {
            let file = File::open(file_path)
                .map_err(|e| AgentError::Params(format!("{}: {}", file_path, e)))?;
            parse_params(BufReader::new(file))
        }
    }
}

pub fn parse_params<R: Read>(reader: R) -> Result<Value, AgentError> {
    let params: Value =
        serde_json::from_reader(reader).map_err(|e| AgentError::Params(e.to_string()))?;
    if !params.is_object() {
        return Err(AgentError::Params(String::from(
            "parameter document must be a JSON object",
        )));
    }
    Ok(params)
}

/// Human readable name of a JSON value's type, used in validation messages.
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[derive(Debug, Serialize)]
pub struct FailureDocument {
    pub failed: bool,
    pub msg: String,
}

impl FailureDocument {
    pub fn new(err: &AgentError) -> FailureDocument {
        FailureDocument {
            failed: true,
            msg: err.to_string(),
        }
    }
}

/// Writes one result document to stdout.
pub fn emit<T: Serialize>(doc: &T) {
    match serde_json::to_string(doc) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("failed to encode result document: {}", e),
    }
}

/// Exclusive advisory lock held for the length of one console session.
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn acquire(path: &Path) -> Result<SessionLock, AgentError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(ExecCause::Io)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EWOULDBLOCK) => ExecCause::Locked(path.to_path_buf()),
                _ => ExecCause::Io(err),
            }
            .into());
        }
        debug!("Acquired session lock {}", path.display());
        Ok(SessionLock {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        debug!("Released session lock {}", self.path.display());
    }
}
