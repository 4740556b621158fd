//! Parent-side errors.

use std::io;
use std::time::Duration;

use crate::scratch::ScratchError;
use crate::spawner::SpawnError;

/// A failure raised inside the child, carried as the child rendered it.
///
/// `Display` is exactly the child's text: category, message and trace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RemoteError(String);

impl RemoteError {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    /// Failure category, e.g. `KeyError`, when the text starts with `"<kind>: "`.
    pub fn kind(&self) -> Option<&str> {
        let (kind, _) = self.0.split_once(':')?;
        (!kind.is_empty() && !kind.contains(char::is_whitespace)).then_some(kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] SpawnError),

    #[error("worker startup failed: {0}")]
    Startup(String),

    #[error("worker did not signal readiness within {0:?}")]
    StartupTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("worker closed the channel")]
    TransportClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Scratch(#[from] ScratchError),

    /// Use-after-close. Raised before touching the transport.
    #[error("session is closed")]
    Closed,

    /// An earlier transport failure, protocol violation or abandoned request
    /// left the channel in an unknown state.
    #[error("session is defunct; close it and start a new one")]
    Defunct,
}

impl SessionError {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The session can keep serving requests after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Scratch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_is_verbatim() {
        let text = "ZeroDivisionError: division by zero\n  at line 1 (<eval>): 1/0";
        let err = SessionError::from(RemoteError::new(text));
        assert_eq!(err.to_string(), text);
        assert!(err.is_remote());
        assert!(err.is_recoverable());
    }

    #[test]
    fn remote_kind() {
        assert_eq!(RemoteError::new("KeyError: 'x'").kind(), Some("KeyError"));
        assert_eq!(
            RemoteError::new("unknown message type: foo").kind(),
            None
        );
    }

    #[test]
    fn fatal_errors() {
        assert!(!SessionError::TransportClosed.is_recoverable());
        assert!(!SessionError::Closed.is_recoverable());
        assert_eq!(SessionError::Closed.to_string(), "session is closed");
    }
}
