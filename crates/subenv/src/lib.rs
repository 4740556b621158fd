//! subenv: persistent child interpreter sessions.
//!
//! A parent [`Session`] launches a worker process and drives it over a framed
//! request/response channel: `exec`, `eval`, `call`, `get`, `set`, `quit`. The
//! worker's namespace lives as long as the process does. Values travel through
//! scratch files referenced by path.

mod blocking;
mod fd_redirect;
mod namespace;

pub mod bridge;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod scratch;
pub mod script;
pub mod session;
pub mod spawner;
pub mod worker;

pub use blocking::BlockingSession;
pub use bridge::protocol::{PROTOCOL_VERSION, Reply, Request, ValueHandle};
pub use bridge::transport::{FramedTransport, Transport, WorkerTransport};
pub use config::SessionConfig;
pub use error::{RemoteError, SessionError};
pub use interpreter::{Failure, Interpreter, Target};
pub use namespace::Namespace;
pub use script::ScriptInterpreter;
pub use session::{Session, SessionState, WorkerInfo};
pub use spawner::{CommandSpawner, PythonSpawner, SpawnContext, SpawnError, WorkerSpawner};
pub use worker::{WorkerConfig, run_worker};
