//! Synchronous facade over [`Session`] for callers without an async runtime.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{Session, SessionState, WorkerInfo};

/// A [`Session`] driven on its own current-thread runtime.
///
/// Every method blocks the calling thread until the worker answers. Dropping
/// the session closes it.
pub struct BlockingSession {
    runtime: Runtime,
    inner: Session,
}

impl BlockingSession {
    pub fn start(config: SessionConfig) -> Result<Self, SessionError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let inner = runtime.block_on(Session::start(config))?;
        Ok(Self { runtime, inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn info(&self) -> &WorkerInfo {
        self.inner.info()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn exec(&mut self, code: &str) -> Result<(), SessionError> {
        self.runtime.block_on(self.inner.exec(code))
    }

    pub fn eval<R: DeserializeOwned>(&mut self, expr: &str) -> Result<R, SessionError> {
        self.runtime.block_on(self.inner.eval(expr))
    }

    pub fn call<R, A, K>(&mut self, target: &str, args: &A, kwargs: &K) -> Result<R, SessionError>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        self.runtime.block_on(self.inner.call(target, args, kwargs))
    }

    pub fn get<R: DeserializeOwned>(&mut self, name: &str) -> Result<R, SessionError> {
        self.runtime.block_on(self.inner.get(name))
    }

    pub fn set<V: Serialize + ?Sized>(&mut self, name: &str, value: &V) -> Result<(), SessionError> {
        self.runtime.block_on(self.inner.set(name, value))
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.inner.close());
    }
}

impl Drop for BlockingSession {
    fn drop(&mut self) {
        if !self.inner.is_closed() {
            self.close();
        }
    }
}
