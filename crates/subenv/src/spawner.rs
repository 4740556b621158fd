//! Launching worker processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::scratch::SCRATCH_DIR_ENV;

/// Per-spawn parameters the session hands to a [`WorkerSpawner`].
#[derive(Debug, Clone)]
pub struct SpawnContext {
    pub scratch_dir: PathBuf,
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different worker launch strategies.
///
/// The returned child must have piped stdin and stdout.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, ctx: &SpawnContext) -> Result<Child, SpawnError>;

    /// For logs.
    fn describe(&self) -> String;
}

/// Runs the dispatcher inside a Python interpreter that has the `subenv`
/// extension module installed.
#[derive(Debug, Clone)]
pub struct PythonSpawner {
    python: PathBuf,
}

impl Default for PythonSpawner {
    fn default() -> Self {
        Self::new("python")
    }
}

impl PythonSpawner {
    pub const BOOTSTRAP: &'static str = "import subenv; subenv._run_worker()";

    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }
}

impl WorkerSpawner for PythonSpawner {
    fn spawn(&self, ctx: &SpawnContext) -> Result<Child, SpawnError> {
        let mut command = worker_command(&self.python, ctx);
        command.args(["-c", Self::BOOTSTRAP]);
        launch(command, &self.python)
    }

    fn describe(&self) -> String {
        format!("{} -c {:?}", self.python.display(), Self::BOOTSTRAP)
    }
}

/// Runs an arbitrary program that serves the protocol on stdio, such as
/// `subenv-worker`.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self, ctx: &SpawnContext) -> Result<Child, SpawnError> {
        let mut command = worker_command(&self.program, ctx);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(k, v)| (k, v)));
        launch(command, &self.program)
    }

    fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

fn worker_command(program: &Path, ctx: &SpawnContext) -> Command {
    let mut command = Command::new(program);
    command
        .env(SCRATCH_DIR_ENV, &ctx.scratch_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if ctx.verbose && std::env::var_os(crate::logging::LOG_ENV).is_none() {
        command.env(crate::logging::LOG_ENV, "debug");
    }
    command
}

fn launch(mut command: Command, program: &Path) -> Result<Child, SpawnError> {
    let child = command.spawn().map_err(|source| SpawnError::Spawn {
        program: program.display().to_string(),
        source,
    })?;
    tracing::debug!(pid = ?child.id(), program = %program.display(), "Spawned worker");
    Ok(child)
}
