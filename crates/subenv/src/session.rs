//! Parent side of a session: one child, one channel, one request at a time.
//!
//! Flow:
//! 1. Spawn the worker and wait for its `ready` message
//! 2. For each call: spill inputs, send one request, wait for one reply, decode the result
//! 3. `close`: send `quit`, then release the process whether or not it answered
//!
//! ```text
//! Starting ──► Ready ──► Busy ──► Ready ──► ... ──► Closing ──► Closed
//!                          │
//!                          └──(transport failure / dropped future)──► Defunct ──► Closing
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::bridge::protocol::{PROTOCOL_VERSION, Reply, Request, ValueHandle};
use crate::bridge::transport::{Transport, WorkerTransport};
use crate::config::SessionConfig;
use crate::error::{RemoteError, SessionError};
use crate::scratch::{self, Scratch};
use crate::spawner::SpawnContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Ready,
    /// A request is on the wire and its reply has not arrived.
    Busy,
    Closing,
    Closed,
    /// The channel can no longer be trusted. Only `close` is allowed.
    Defunct,
}

/// What the worker announced in its readiness message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub protocol: u32,
    pub interpreter: String,
}

pub struct Session<T: Transport = WorkerTransport> {
    id: Uuid,
    transport: T,
    scratch: Scratch,
    state: SessionState,
    info: WorkerInfo,
    shutdown_timeout: Duration,
    verbose: bool,
}

impl Session<WorkerTransport> {
    /// Spawn a worker with `config.spawner` and wait until it is ready.
    pub async fn start(config: SessionConfig) -> Result<Self, SessionError> {
        tracing::debug!(spawner = %config.spawner.describe(), "Starting session");
        let ctx = SpawnContext {
            scratch_dir: config.scratch_dir.clone(),
            verbose: config.verbose,
        };
        let child = config.spawner.spawn(&ctx)?;
        let transport = WorkerTransport::from_child(child, config.shutdown_timeout)
            .map_err(|e| SessionError::Startup(e.to_string()))?;
        Self::with_transport(transport, &config).await
    }

    pub fn pid(&self) -> Option<u32> {
        self.transport.pid()
    }
}

impl<T: Transport> Session<T> {
    /// Run the handshake over an already-connected transport.
    ///
    /// On failure the transport is terminated before returning.
    pub async fn with_transport(mut transport: T, config: &SessionConfig) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        let started = Instant::now();

        let info = match handshake(&mut transport, config.startup_timeout).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(session = %id, error = %e, "Worker failed to start");
                if let Err(te) = transport.terminate().await {
                    tracing::debug!(session = %id, error = %te, "Terminating failed worker");
                }
                return Err(e);
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if config.verbose {
            tracing::info!(session = %id, interpreter = %info.interpreter, elapsed_ms, "Session ready");
        } else {
            tracing::debug!(session = %id, interpreter = %info.interpreter, elapsed_ms, "Session ready");
        }

        Ok(Self {
            id,
            transport,
            scratch: Scratch::parent(config.scratch_dir.clone()),
            state: SessionState::Ready,
            info,
            shutdown_timeout: config.shutdown_timeout,
            verbose: config.verbose,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Run `code` as statements in the child's namespace.
    pub async fn exec(&mut self, code: &str) -> Result<(), SessionError> {
        if self.verbose {
            tracing::info!(session = %self.id, code, "exec");
        }
        let handle = self
            .request(Request::Exec {
                code: code.to_string(),
            })
            .await?;
        if let Some(handle) = handle {
            scratch::discard(&handle);
        }
        Ok(())
    }

    /// Evaluate one expression in the child and decode its value.
    pub async fn eval<R: DeserializeOwned>(&mut self, expr: &str) -> Result<R, SessionError> {
        let handle = self
            .request(Request::Eval {
                expr: expr.to_string(),
            })
            .await?;
        take_result(handle)
    }

    /// Invoke a `module:attr` target with positional and keyword arguments.
    ///
    /// `args` must serialize to a JSON array and `kwargs` to a JSON object.
    pub async fn call<R, A, K>(&mut self, target: &str, args: &A, kwargs: &K) -> Result<R, SessionError>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        self.ensure_usable()?;
        // Guards remove both files on every path once this call returns.
        let args = self.scratch.spill(args)?;
        let kwargs = self.scratch.spill(kwargs)?;
        let handle = self
            .request(Request::Call {
                target: target.to_string(),
                args: args.handle(),
                kwargs: kwargs.handle(),
            })
            .await?;
        take_result(handle)
    }

    /// Read a bound name from the child's namespace.
    pub async fn get<R: DeserializeOwned>(&mut self, name: &str) -> Result<R, SessionError> {
        let handle = self
            .request(Request::Get {
                name: name.to_string(),
            })
            .await?;
        take_result(handle)
    }

    /// Bind `name` in the child's namespace.
    pub async fn set<V: Serialize + ?Sized>(&mut self, name: &str, value: &V) -> Result<(), SessionError> {
        self.ensure_usable()?;
        let file = self.scratch.spill(value)?;
        let handle = self
            .request(Request::Set {
                name: name.to_string(),
                value: file.handle(),
            })
            .await?;
        if let Some(handle) = handle {
            scratch::discard(&handle);
        }
        Ok(())
    }

    /// Send `quit` and release the worker. Never fails; calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let polite = self.state == SessionState::Ready;
        self.state = SessionState::Closing;

        if polite {
            match tokio::time::timeout(self.shutdown_timeout, self.quit()).await {
                Ok(Ok(())) => tracing::debug!(session = %self.id, "Worker acknowledged quit"),
                Ok(Err(e)) => {
                    tracing::debug!(session = %self.id, error = %e, "Quit exchange failed")
                }
                Err(_) => tracing::warn!(session = %self.id, "Worker did not acknowledge quit in time"),
            }
        }

        if let Err(e) = self.transport.terminate().await {
            tracing::warn!(session = %self.id, error = %e, "Failed to release worker");
        }
        self.state = SessionState::Closed;
        tracing::debug!(session = %self.id, "Session closed");
    }

    async fn quit(&mut self) -> Result<(), SessionError> {
        self.transport.send(Request::Quit).await?;
        match self.transport.receive().await? {
            Some(Reply::Ok { .. }) => Ok(()),
            Some(other) => Err(SessionError::Protocol(format!(
                "unexpected reply to quit: {other:?}"
            ))),
            None => Err(SessionError::TransportClosed),
        }
    }

    fn ensure_usable(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closing | SessionState::Closed => Err(SessionError::Closed),
            SessionState::Defunct => Err(SessionError::Defunct),
            SessionState::Busy => {
                // The previous request's future was dropped before its reply arrived.
                tracing::warn!(session = %self.id, "Previous request was abandoned mid-flight");
                self.state = SessionState::Defunct;
                Err(SessionError::Defunct)
            }
            SessionState::Starting => Err(SessionError::Protocol(
                "session has not completed its handshake".to_string(),
            )),
        }
    }

    /// One request, one reply. The only place the transport is driven.
    async fn request(&mut self, request: Request) -> Result<Option<ValueHandle>, SessionError> {
        self.ensure_usable()?;

        let kind = request.kind();
        let started = Instant::now();
        self.state = SessionState::Busy;

        if let Err(e) = self.transport.send(request).await {
            self.state = SessionState::Defunct;
            tracing::error!(session = %self.id, kind, error = %e, "Failed to send request");
            return Err(SessionError::Transport(e));
        }

        let reply = match self.transport.receive().await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                self.state = SessionState::Defunct;
                tracing::error!(session = %self.id, kind, "Worker closed the channel mid-request");
                return Err(SessionError::TransportClosed);
            }
            Err(e) => {
                self.state = SessionState::Defunct;
                tracing::error!(session = %self.id, kind, error = %e, "Failed to receive reply");
                return Err(SessionError::Transport(e));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if self.verbose {
            tracing::info!(session = %self.id, kind, elapsed_ms, "Request complete");
        } else {
            tracing::debug!(session = %self.id, kind, elapsed_ms, "Request complete");
        }

        match reply {
            Reply::Ok { handle } => {
                self.state = SessionState::Ready;
                Ok(handle)
            }
            Reply::Err { error } => {
                self.state = SessionState::Ready;
                Err(SessionError::Remote(RemoteError::new(error)))
            }
            Reply::Ready { .. } => {
                self.state = SessionState::Defunct;
                Err(SessionError::Protocol(
                    "unexpected readiness message in reply to a request".to_string(),
                ))
            }
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            tracing::debug!(session = %self.id, state = ?self.state, "Session dropped without close");
        }
    }
}

async fn handshake<T: Transport>(transport: &mut T, timeout: Duration) -> Result<WorkerInfo, SessionError> {
    let reply = match tokio::time::timeout(timeout, transport.receive()).await {
        Ok(Ok(Some(reply))) => reply,
        Ok(Ok(None)) => {
            return Err(SessionError::Startup(
                "worker exited before signalling readiness".to_string(),
            ));
        }
        Ok(Err(e)) => return Err(SessionError::Startup(format!("channel error: {e}"))),
        Err(_) => return Err(SessionError::StartupTimeout(timeout)),
    };

    match reply {
        Reply::Ready {
            protocol,
            interpreter,
        } if protocol == PROTOCOL_VERSION => Ok(WorkerInfo {
            protocol,
            interpreter,
        }),
        Reply::Ready { protocol, .. } => Err(SessionError::Startup(format!(
            "worker speaks protocol {protocol}, expected {PROTOCOL_VERSION}"
        ))),
        other => Err(SessionError::Startup(format!(
            "expected readiness signal, got {other:?}"
        ))),
    }
}

fn take_result<R: DeserializeOwned>(handle: Option<ValueHandle>) -> Result<R, SessionError> {
    let handle = handle.ok_or_else(|| SessionError::Protocol("reply carries no value".to_string()))?;
    Ok(scratch::take(&handle)?)
}
