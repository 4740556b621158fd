//! Session configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::spawner::{CommandSpawner, PythonSpawner, WorkerSpawner};

pub struct SessionConfig {
    pub spawner: Arc<dyn WorkerSpawner>,
    /// Where both sides put scratch files. Forwarded to the child.
    pub scratch_dir: PathBuf,
    /// How long to wait for the readiness signal.
    pub startup_timeout: Duration,
    /// How long `close` waits for the worker to exit before killing it.
    pub shutdown_timeout: Duration,
    /// Log startup, exec source and per-request timings at `info`.
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Arc::new(PythonSpawner::default()))
    }
}

impl SessionConfig {
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            spawner,
            scratch_dir: std::env::temp_dir(),
            startup_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(5),
            verbose: false,
        }
    }

    /// Run the dispatcher in the given Python interpreter.
    pub fn python(python: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(PythonSpawner::new(python)))
    }

    /// Run a standalone worker program.
    pub fn command(program: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(CommandSpawner::new(program)))
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.startup_timeout, Duration::from_secs(300));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(!config.verbose);
        assert!(config.spawner.describe().starts_with("python -c"));
    }

    #[test]
    fn builder() {
        let config = SessionConfig::command("subenv-worker")
            .with_scratch_dir("/var/tmp")
            .with_startup_timeout(Duration::from_secs(1))
            .with_verbose(true);
        assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp"));
        assert_eq!(config.startup_timeout, Duration::from_secs(1));
        assert!(config.verbose);
        assert_eq!(config.spawner.describe(), "subenv-worker");
    }
}
