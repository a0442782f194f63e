//! # ISIS tool invocations
//!
//! USGS ISIS applications are command line programs taking `key=value` parameters:
//!
//! ```text
//! mroctx2isis from=P01_001234_1234_XN_00N01W.IMG to=P01_001234_1234_XN_00N01W.cub
//! ```
//!
//! [`IsisCommand`] builds and runs such a call. A failed call (program not found, or a
//! non-zero exit) is logged with its command line and output and returned as an
//! [`IsisError`], so a processing pipeline stops at the failing step.
use std::fmt;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, error};

/// Failure of an external tool.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("`{cmd}` failed (status {status:?}): {stderr}")]
pub struct IsisError {
    /// The command line, program and parameters
    pub cmd: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the program could not be started or was killed
    pub status: Option<i32>,
}

/// One ISIS application call.
#[derive(Debug, Clone, PartialEq)]
pub struct IsisCommand {
    program: String,
    params: Vec<(String, String)>,
}

impl IsisCommand {
    pub fn new(program: impl Into<String>) -> Self {
        IsisCommand {
            program: program.into(),
            params: Vec::new(),
        }
    }

    /// Add a `key=value` parameter.
    pub fn arg(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Parameters as passed on the command line.
    pub fn args(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }

    /// Run the program and wait for it.
    ///
    /// Return
    /// ----------
    /// * The standard output on success, an [`IsisError`] otherwise.
    pub fn run(&self) -> Result<String, IsisError> {
        let cmd = self.to_string();
        debug!(%cmd, "running ISIS tool");

        let output = Command::new(&self.program)
            .args(self.args())
            .output()
            .map_err(|e| {
                let err = IsisError {
                    cmd: cmd.clone(),
                    stdout: String::new(),
                    stderr: e.to_string(),
                    status: None,
                };
                error!(cmd = %err.cmd, stderr = %err.stderr, "could not start ISIS tool");
                err
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let err = IsisError {
            cmd,
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        };
        error!(
            cmd = %err.cmd,
            stdout = %err.stdout,
            stderr = %err.stderr,
            "Had ISIS error"
        );
        Err(err)
    }
}

impl fmt::Display for IsisCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
