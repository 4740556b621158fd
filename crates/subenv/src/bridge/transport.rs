//! Parent-side message transport.
//!
//! - **FramedTransport**: any AsyncRead/AsyncWrite pair (in-process pipes, sockets)
//! - **WorkerTransport**: a spawned child process, framed over its stdin/stdout

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;
use super::protocol::{Reply, Request};

/// Ordered, lossless, blocking message delivery to one child.
///
/// The session never calls `send` twice without a `receive` in between.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: Request) -> io::Result<()>;

    /// Next reply from the child, or `None` once the channel is closed.
    async fn receive(&mut self) -> io::Result<Option<Reply>>;

    /// Release the channel and whatever sits behind it. Must not hang.
    async fn terminate(&mut self) -> io::Result<()>;
}

/// Transport over a reader/writer pair.
pub struct FramedTransport<R, W> {
    reader: FramedRead<R, JsonCodec<Reply>>,
    writer: FramedWrite<W, JsonCodec<Request>>,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, JsonCodec::new()),
            writer: FramedWrite::new(writer, JsonCodec::new()),
        }
    }
}

#[async_trait]
impl<R, W> Transport for FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, request: Request) -> io::Result<()> {
        self.writer.send(request).await
    }

    async fn receive(&mut self) -> io::Result<Option<Reply>> {
        self.reader.next().await.transpose()
    }

    async fn terminate(&mut self) -> io::Result<()> {
        // Closing the write half is EOF for the child's dispatcher loop.
        self.writer.close().await
    }
}

/// Transport to a spawned worker process.
pub struct WorkerTransport {
    child: Child,
    framed: FramedTransport<ChildStdout, ChildStdin>,
    shutdown_timeout: Duration,
}

impl WorkerTransport {
    /// Take the child's piped stdio. Fails if either pipe was not captured.
    pub fn from_child(mut child: Child, shutdown_timeout: Duration) -> io::Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout not captured"))?;

        Ok(Self {
            child,
            framed: FramedTransport::new(stdout, stdin),
            shutdown_timeout,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for WorkerTransport {
    async fn send(&mut self, request: Request) -> io::Result<()> {
        self.framed.send(request).await
    }

    async fn receive(&mut self) -> io::Result<Option<Reply>> {
        self.framed.receive().await
    }

    async fn terminate(&mut self) -> io::Result<()> {
        if let Err(e) = self.framed.terminate().await {
            // Broken pipe here just means the worker is already gone.
            tracing::debug!(error = %e, "Closing worker stdin failed");
        }

        match tokio::time::timeout(self.shutdown_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "Worker exited");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Worker did not exit in time, killing"
                );
                self.child.kill().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::ValueHandle;
    use tokio::io::duplex;

    #[tokio::test]
    async fn framed_transport_talks_to_raw_frames() {
        let (parent_end, child_end) = duplex(4096);
        let (parent_read, parent_write) = tokio::io::split(parent_end);
        let (child_read, child_write) = tokio::io::split(child_end);

        let mut transport = FramedTransport::new(parent_read, parent_write);
        let mut child_reader = FramedRead::new(child_read, JsonCodec::<serde_json::Value>::new());
        let mut child_writer = FramedWrite::new(child_write, JsonCodec::<Reply>::new());

        transport
            .send(Request::Get {
                name: "x".to_string(),
            })
            .await
            .unwrap();
        let frame = child_reader.next().await.unwrap().unwrap();
        assert_eq!(frame, serde_json::json!({"type": "get", "name": "x"}));

        child_writer
            .send(Reply::ok_with(ValueHandle::from("/tmp/r.json")))
            .await
            .unwrap();
        let reply = transport.receive().await.unwrap();
        assert!(matches!(reply, Some(Reply::Ok { handle: Some(_) })));
    }

    #[tokio::test]
    async fn framed_transport_reports_closed_channel() {
        let (parent_end, child_end) = duplex(64);
        let (parent_read, parent_write) = tokio::io::split(parent_end);
        let mut transport = FramedTransport::new(parent_read, parent_write);

        drop(child_end);
        assert!(transport.receive().await.unwrap().is_none());
    }
}
