//! Wire protocol types for parent-child communication.
//!
//! One channel (child stdin/stdout), strictly alternating:
//! - child sends `Ready` once, before anything else
//! - parent sends one `Request`, child answers with one `Ok` or `Err`, repeat
//!
//! Values never travel inline. They are spilled to scratch files and referenced
//! by [`ValueHandle`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Bumped whenever a message shape changes. A worker announcing a different
/// version is rejected during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Path reference to a scratch file holding one serialized value.
///
/// Single-use: whoever decodes it deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueHandle(PathBuf);

impl ValueHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<&str> for ValueHandle {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

impl From<PathBuf> for ValueHandle {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl fmt::Display for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Messages from parent to child.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Run statements against the namespace.
    Exec { code: String },

    /// Evaluate one expression; the reply carries a handle to the result.
    Eval { expr: String },

    /// Invoke a `module:attr` target outside the namespace.
    Call {
        target: String,
        args: ValueHandle,
        kwargs: ValueHandle,
    },

    Get { name: String },

    Set { name: String, value: ValueHandle },

    Quit,
}

impl Request {
    /// Every kind the dispatcher understands, as it appears in the `type` field.
    pub const KINDS: [&'static str; 6] = ["exec", "eval", "call", "get", "set", "quit"];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exec { .. } => "exec",
            Self::Eval { .. } => "eval",
            Self::Call { .. } => "call",
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Quit => "quit",
        }
    }

    /// Decode a raw frame on the child side.
    ///
    /// Kept separate from plain deserialization so an unsupported kind can be
    /// answered by name instead of failing the whole frame.
    pub fn from_frame(frame: serde_json::Value) -> Result<Self, ProtocolError> {
        let kind = match frame.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            Some(other) => return Err(ProtocolError::MissingKind(other.to_string())),
            None => return Err(ProtocolError::MissingKind(frame.to_string())),
        };

        if !Self::KINDS.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownKind(kind));
        }

        serde_json::from_value(frame).map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }
}

/// Messages from child to parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Readiness token, sent exactly once before the child accepts requests.
    Ready {
        protocol: u32,
        /// Human-readable description of the child's interpreter.
        interpreter: String,
    },

    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<ValueHandle>,
    },

    /// Rendered failure: category, message and trace, as text.
    Err { error: String },
}

impl Reply {
    pub fn ready(interpreter: impl Into<String>) -> Self {
        Self::Ready {
            protocol: PROTOCOL_VERSION,
            interpreter: interpreter.into(),
        }
    }

    pub fn ok() -> Self {
        Self::Ok { handle: None }
    }

    pub fn ok_with(handle: ValueHandle) -> Self {
        Self::Ok {
            handle: Some(handle),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self::Err {
            error: error.into(),
        }
    }
}

/// Request frames the child could not turn into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("message has no string 'type' field: {0}")]
    MissingKind(String),

    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },
}
