//! IPC bridge for subenv parent-child communication.
//!
//! This module provides the wire protocol and codec for communication between
//! a [`Session`](crate::Session) (parent) and the dispatcher loop in the child.
//!
//! # Architecture
//!
//! - **protocol**: Message types (Request, Reply, ValueHandle)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite
//! - **transport**: Parent-side channel abstraction and the child-process transport

pub mod codec;
pub mod protocol;
pub mod transport;
