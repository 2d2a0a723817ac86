//! Blocking subprocess execution with captured output

use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::error::{GuardError, GuardResult};

/// A command line to run, with extra environment variables
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Build from a program followed by its arguments
    pub fn from_parts(parts: &[String]) -> GuardResult<Self> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| GuardError::Config("Empty tool command".into()))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program name, for error messages
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion, capturing stdout and stderr
    ///
    /// A non-zero exit is not an error here; see `ToolOutput::ensure_success`.
    pub fn run(&self) -> GuardResult<ToolOutput> {
        debug!(program = %self.program, args = self.args.len(), "running external tool");

        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| GuardError::ToolExecution {
                tool: self.program.clone(),
                status: "not started".into(),
                stderr: e.to_string(),
            })?;

        Ok(ToolOutput {
            tool: self.program.clone(),
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Captured result of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turn a non-zero exit into a `ToolExecution` error
    pub fn ensure_success(self) -> GuardResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// The failure as a `ToolExecution` error, preferring stderr for detail
    pub fn into_error(self) -> GuardError {
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        GuardError::ToolExecution {
            tool: self.tool,
            status: self.status.to_string(),
            stderr: detail,
        }
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}
