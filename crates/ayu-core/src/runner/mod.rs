//! Launching test runs.
//!
//! The dashboard never runs tests on the dispatch path: it builds a
//! [`RunnerCommand`], hands it to a [`TestRunner`] on its own task, and
//! learns about progress only through the events the run's plugin sends
//! back over the channel.

pub mod command;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::channel::{ChannelConfig, HOST_ENV, PORT_ENV};

pub use command::{Plugin, RunnerCommand, Selection, DISABLED_OPTIONS};

/// What a finished run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Executes a [`RunnerCommand`] to completion.
///
/// Object-safe so the dashboard can hold a `Box<dyn TestRunner>` and tests
/// can substitute a scripted runner.
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, command: &RunnerCommand) -> Result<RunOutput>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn TestRunner) {}
};

/// Runs commands as child processes, pointing their plugin at the
/// dashboard's endpoint.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    channel: ChannelConfig,
    working_dir: Option<PathBuf>,
    program: Option<String>,
}

impl ProcessRunner {
    pub fn new(channel: ChannelConfig) -> Self {
        Self {
            channel,
            working_dir: None,
            program: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replace the launcher (`uv`) with another program; the remaining
    /// arguments are passed unchanged.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }
}

#[async_trait]
impl TestRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, command: &RunnerCommand) -> Result<RunOutput> {
        let argv = command.argv();
        let (default_program, args) = argv
            .split_first()
            .context("runner command produced an empty argv")?;
        let program = self.program.as_deref().unwrap_or(default_program.as_str());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(HOST_ENV, &self.channel.host)
            .env(PORT_ENV, self.channel.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::info!(command = %command, "starting test run");
        let started = Instant::now();
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to launch '{program}' -- is it installed and on PATH?"))?;
        let duration = started.elapsed();

        let result = RunOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        };
        tracing::info!(code = ?result.code, ?duration, "test run finished");
        Ok(result)
    }
}
