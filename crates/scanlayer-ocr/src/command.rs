// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External command runner.
//
// Every external tool (rasterizer, recognition engine, merge tool,
// introspection tool) is invoked through `CommandRunner` with an explicit
// argument list and captured stdout/stderr.  A runner only fails for spawn
// errors and timeouts; judging the exit code is left to the caller via
// `CommandOutput::require_success`, which normalises failures to
// `tool + exit code + truncated output`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use scanlayer_core::error::{Result, ScanlayerError};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// The job an external tool performs in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolRole {
    Rasterizer,
    Recognizer,
    Merger,
    Inspector,
}

impl ToolRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Rasterizer => "rasterizer",
            Self::Recognizer => "recognizer",
            Self::Merger => "merger",
            Self::Inspector => "inspector",
        }
    }

    /// Argument that makes the tool print its version and exit.
    fn version_flag(self) -> &'static str {
        match self {
            // poppler tools print their version for -v
            Self::Rasterizer | Self::Inspector => "-v",
            Self::Recognizer | Self::Merger => "--version",
        }
    }
}

/// One fully specified external process invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub role: ToolRole,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(role: ToolRole, program: impl Into<PathBuf>) -> Self {
        Self {
            role,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name used in error messages: the program's file name.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.role.label().to_string())
    }

    /// The argument following `flag`, if present.
    pub fn arg_after(&self, flag: &str) -> Option<&Path> {
        let index = self.args.iter().position(|a| a == flag)?;
        self.args.get(index + 1).map(Path::new)
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn exited(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Accept exit code 0 plus any of `also_ok`; anything else becomes a
    /// normalised [`ScanlayerError::Tool`].
    pub fn require_success(&self, tool: &str, also_ok: &[i32]) -> Result<()> {
        match self.code {
            Some(0) => Ok(()),
            Some(code) if also_ok.contains(&code) => {
                debug!(tool, code, "accepted non-zero exit code");
                Ok(())
            }
            code => {
                let captured = if self.stderr.trim().is_empty() {
                    &self.stdout
                } else {
                    &self.stderr
                };
                Err(ScanlayerError::tool(tool, code, captured))
            }
        }
    }
}

/// Runs external processes on behalf of the pipeline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion and capture its output.
    ///
    /// Returns `Err` only if the process could not be started or exceeded its
    /// timeout; a non-zero exit is reported through [`CommandOutput::code`].
    async fn run(&self, invocation: &ToolInvocation) -> Result<CommandOutput>;

    /// Whether the tool at `program` can be started at all.
    async fn probe(&self, role: ToolRole, program: &Path) -> bool {
        let invocation = ToolInvocation::new(role, program)
            .arg(role.version_flag())
            .timeout(Some(Duration::from_secs(10)));
        self.run(&invocation).await.is_ok()
    }
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(tool = %invocation.tool_name(), role = invocation.role.label()))]
    async fn run(&self, invocation: &ToolInvocation) -> Result<CommandOutput> {
        let tool = invocation.tool_name();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (timeout, job cancelled) kills the process.
            .kill_on_drop(true);

        debug!(args = ?invocation.args, "spawning external tool");
        let child = command.spawn().map_err(|source| ScanlayerError::ToolSpawn {
            tool: tool.clone(),
            source,
        })?;

        let waited = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!(after_secs = limit.as_secs(), "external tool timed out, killed");
                    return Err(ScanlayerError::TimedOut { tool, after: limit });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ScanlayerError::ToolSpawn {
            tool: tool.clone(),
            source,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(code = ?result.code, "external tool finished");
        Ok(result)
    }
}
