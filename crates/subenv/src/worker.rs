//! Child side of a session: the dispatcher loop.
//!
//! The parent side (spawning, request helpers) is in session.rs.
//!
//! The loop announces readiness once, then serves one request at a time until
//! it receives `quit` or the channel closes. Failures raised while serving a
//! request become `err` replies; only channel I/O errors end the loop early.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{JsonCodec, frame_codec};
use crate::bridge::protocol::{Reply, Request, ValueHandle};
use crate::interpreter::{Failure, Interpreter, Target};
use crate::scratch::{self, Scratch, ScratchError, ScratchFile};

pub struct WorkerConfig {
    /// Where result values are spilled.
    pub scratch: Scratch,
    /// Move the protocol off fd 0/1 before serving (unix only).
    pub isolate_stdio: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scratch: Scratch::child_from_env(),
            isolate_stdio: true,
        }
    }
}

impl WorkerConfig {
    pub fn with_scratch(mut self, scratch: Scratch) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn with_isolate_stdio(mut self, isolate: bool) -> Self {
        self.isolate_stdio = isolate;
        self
    }
}

/// Serve the protocol over this process's stdin/stdout.
pub async fn run_worker<I: Interpreter>(
    interpreter: &mut I,
    config: WorkerConfig,
) -> io::Result<()> {
    if config.isolate_stdio {
        match crate::fd_redirect::isolate_protocol_fds() {
            Ok(fds) => {
                let input = tokio::fs::File::from_std(fds.input);
                let output = tokio::fs::File::from_std(fds.output);
                return serve(interpreter, &config.scratch, input, output).await;
            }
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                tracing::debug!(error = %e, "Serving on shared stdio");
            }
            Err(e) => return Err(e),
        }
    }

    serve(
        interpreter,
        &config.scratch,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
}

/// Run the dispatcher loop over an arbitrary reader/writer pair.
pub async fn serve<I, R, W>(
    interpreter: &mut I,
    scratch: &Scratch,
    reader: R,
    writer: W,
) -> io::Result<()>
where
    I: Interpreter,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, frame_codec());
    let mut replies = FramedWrite::new(writer, JsonCodec::<Reply>::new());

    let description = interpreter.describe();
    tracing::info!(interpreter = %description, "Worker ready");
    replies.send(Reply::ready(description)).await?;

    loop {
        let bytes = match frames.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Protocol channel error");
                return Err(e);
            }
            None => {
                tracing::info!("Protocol channel closed (parent gone?), exiting");
                break;
            }
        };

        let request = match serde_json::from_slice::<Value>(&bytes) {
            Ok(frame) => Request::from_frame(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Frame is not JSON");
                replies
                    .send(Reply::err(format!("malformed frame: {e}")))
                    .await?;
                continue;
            }
        };

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected request");
                replies.send(Reply::err(e.to_string())).await?;
                continue;
            }
        };

        if matches!(request, Request::Quit) {
            tracing::info!("Quit requested");
            replies.send(Reply::ok()).await?;
            break;
        }

        let kind = request.kind();
        let started = Instant::now();
        let reply = match dispatch_guarded(interpreter, scratch, request) {
            Ok(None) => Reply::ok(),
            Ok(Some(file)) => Reply::ok_with(file.into_handle()),
            Err(failure) => {
                tracing::debug!(kind, failure = %failure.kind, "Request failed");
                Reply::err(failure.render())
            }
        };
        tracing::debug!(
            kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request served"
        );

        let handle = match &reply {
            Reply::Ok { handle } => handle.clone(),
            _ => None,
        };
        if let Err(e) = replies.send(reply).await {
            // The parent will never read it.
            if let Some(handle) = handle {
                scratch::discard(&handle);
            }
            tracing::error!(error = %e, "Failed to send reply");
            return Err(e);
        }
    }

    tracing::info!("Worker exiting");
    Ok(())
}

/// [`dispatch`] with panics converted into a `Panic` failure.
fn dispatch_guarded<I: Interpreter>(
    interpreter: &mut I,
    scratch: &Scratch,
    request: Request,
) -> Result<Option<ScratchFile>, Failure> {
    match catch_unwind(AssertUnwindSafe(|| dispatch(interpreter, scratch, request))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%message, "Interpreter panicked");
            Err(Failure::new("Panic", message))
        }
    }
}

/// Serve one request. A returned file holds the result value.
fn dispatch<I: Interpreter>(
    interpreter: &mut I,
    scratch: &Scratch,
    request: Request,
) -> Result<Option<ScratchFile>, Failure> {
    match request {
        Request::Exec { code } => {
            tracing::trace!(code_len = code.len(), "exec");
            interpreter.exec(&code)?;
            Ok(None)
        }
        Request::Eval { expr } => {
            let value = interpreter.eval(&expr)?;
            spill(scratch, &value).map(Some)
        }
        Request::Call {
            target,
            args,
            kwargs,
        } => {
            // Both inputs are consumed before anything can fail.
            let args = take_as::<Vec<Value>>(&args, "list", "positional arguments");
            let kwargs = take_as::<Map<String, Value>>(&kwargs, "dict", "keyword arguments");
            let target = Target::parse(&target)?;
            let value = interpreter.call(&target, args?, kwargs?)?;
            spill(scratch, &value).map(Some)
        }
        Request::Get { name } => {
            let value = interpreter.get(&name)?;
            spill(scratch, &value).map(Some)
        }
        Request::Set { name, value } => {
            let value: Value = scratch::take(&value).map_err(Failure::from)?;
            interpreter.set(&name, value)?;
            Ok(None)
        }
        // Answered by the loop itself.
        Request::Quit => Ok(None),
    }
}

fn spill(scratch: &Scratch, value: &Value) -> Result<ScratchFile, Failure> {
    scratch.spill(value).map_err(Failure::from)
}

/// Decode a handle that must hold a specific JSON shape.
fn take_as<T: serde::de::DeserializeOwned>(
    handle: &ValueHandle,
    shape: &str,
    what: &str,
) -> Result<T, Failure> {
    let value: Value = scratch::take(handle)?;
    let actual = json_type(&value);
    serde_json::from_value(value).map_err(|_| {
        Failure::type_error(format!("{what} must be a {shape}, got '{actual}'"))
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

impl From<ScratchError> for Failure {
    fn from(err: ScratchError) -> Self {
        let kind = match &err {
            ScratchError::Io { .. } => "OSError",
            ScratchError::Encode(_) => "TypeError",
            ScratchError::Decode { .. } => "ValueError",
        };
        Failure::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptInterpreter;
    use serde_json::json;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex};
    use tokio_util::bytes::Bytes;

    struct Harness {
        scratch: Scratch,
        dir: tempfile::TempDir,
        requests: FramedWrite<WriteHalf<DuplexStream>, JsonCodec<Value>>,
        replies: FramedRead<ReadHalf<DuplexStream>, JsonCodec<Reply>>,
        worker: tokio::task::JoinHandle<io::Result<()>>,
    }

    fn start() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::parent(dir.path());
        let child_scratch = Scratch::new(dir.path(), scratch::CHILD_PREFIX);

        let (parent_end, child_end) = duplex(64 * 1024);
        let (parent_read, parent_write) = tokio::io::split(parent_end);
        let (child_read, child_write) = tokio::io::split(child_end);

        let worker = tokio::spawn(async move {
            let mut interp = ScriptInterpreter::new();
            serve(&mut interp, &child_scratch, child_read, child_write).await
        });

        Harness {
            scratch,
            dir,
            requests: FramedWrite::new(parent_write, JsonCodec::new()),
            replies: FramedRead::new(parent_read, JsonCodec::new()),
            worker,
        }
    }

    impl Harness {
        async fn next(&mut self) -> Reply {
            self.replies.next().await.unwrap().unwrap()
        }

        async fn roundtrip(&mut self, frame: Value) -> Reply {
            self.requests.send(frame).await.unwrap();
            self.next().await
        }

        fn handle(&self, value: Value) -> String {
            self.scratch
                .spill(&value)
                .unwrap()
                .into_handle()
                .to_string()
        }

        fn files(&self) -> usize {
            std::fs::read_dir(self.dir.path()).unwrap().count()
        }
    }

    fn value_of(reply: Reply) -> Value {
        match reply {
            Reply::Ok {
                handle: Some(handle),
            } => scratch::take(&handle).unwrap(),
            other => panic!("expected a value, got {other:?}"),
        }
    }

    fn error_of(reply: Reply) -> String {
        match reply {
            Reply::Err { error } => error,
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn announces_readiness_first() {
        let mut h = start();
        match h.next().await {
            Reply::Ready {
                protocol,
                interpreter,
            } => {
                assert_eq!(protocol, crate::bridge::protocol::PROTOCOL_VERSION);
                assert!(interpreter.starts_with("subenv-script"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exec_eval_get_set() {
        let mut h = start();
        h.next().await;

        let reply = h.roundtrip(json!({"type": "exec", "code": "x = 20 + 1"})).await;
        assert!(matches!(reply, Reply::Ok { handle: None }));

        let reply = h.roundtrip(json!({"type": "eval", "expr": "x * 2"})).await;
        assert_eq!(value_of(reply), json!(42));

        let value = h.handle(json!({"k": [1, 2]}));
        let reply = h
            .roundtrip(json!({"type": "set", "name": "y", "value": value}))
            .await;
        assert!(matches!(reply, Reply::Ok { handle: None }));

        let reply = h.roundtrip(json!({"type": "get", "name": "y"})).await;
        assert_eq!(value_of(reply), json!({"k": [1, 2]}));

        assert_eq!(h.files(), 0);
    }

    #[tokio::test]
    async fn call_consumes_both_handles_even_on_failure() {
        let mut h = start();
        h.next().await;

        let args = h.handle(json!([3]));
        let kwargs = h.handle(json!({"exp": 3}));
        let reply = h
            .roundtrip(json!({"type": "call", "target": "math:pow", "args": args, "kwargs": kwargs}))
            .await;
        assert_eq!(value_of(reply), json!(27));

        let args = h.handle(json!([1]));
        let kwargs = h.handle(json!({}));
        let reply = h
            .roundtrip(json!({"type": "call", "target": "nowhere:f", "args": args, "kwargs": kwargs}))
            .await;
        assert_eq!(error_of(reply), "ModuleNotFoundError: No module named 'nowhere'");

        let args = h.handle(json!({"not": "a list"}));
        let kwargs = h.handle(json!({}));
        let reply = h
            .roundtrip(json!({"type": "call", "target": "math:pow", "args": args, "kwargs": kwargs}))
            .await;
        assert_eq!(
            error_of(reply),
            "TypeError: positional arguments must be a list, got 'dict'"
        );

        assert_eq!(h.files(), 0);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let mut h = start();
        h.next().await;

        let error = error_of(h.roundtrip(json!({"type": "eval", "expr": "1/0"})).await);
        assert!(error.starts_with("ZeroDivisionError: division by zero"), "{error}");

        let error = error_of(h.roundtrip(json!({"type": "get", "name": "nope"})).await);
        assert_eq!(error, "KeyError: 'nope'");

        let reply = h.roundtrip(json!({"type": "eval", "expr": "1 + 1"})).await;
        assert_eq!(value_of(reply), json!(2));
    }

    #[tokio::test]
    async fn deeply_nested_expressions_do_not_kill_the_worker() {
        let mut h = start();
        h.next().await;

        let negations = format!("{}1", "-".repeat(200_000));
        let error = error_of(h.roundtrip(json!({"type": "eval", "expr": negations})).await);
        assert!(error.starts_with("SyntaxError: expression too deeply nested"), "{error}");

        let sum = vec!["1"; 300_000].join("+");
        let error = error_of(h.roundtrip(json!({"type": "exec", "code": format!("x = {sum}")})).await);
        assert!(error.starts_with("SyntaxError: expression too deeply nested"), "{error}");

        let reply = h.roundtrip(json!({"type": "eval", "expr": "1 + 1"})).await;
        assert_eq!(value_of(reply), json!(2));
    }

    #[tokio::test]
    async fn unknown_and_malformed_requests() {
        let mut h = start();
        h.next().await;

        let error = error_of(h.roundtrip(json!({"type": "frobnicate"})).await);
        assert_eq!(error, "unknown message type: frobnicate");

        let error = error_of(h.roundtrip(json!({"type": "get"})).await);
        assert!(error.starts_with("malformed get message"), "{error}");

        let error = error_of(h.roundtrip(json!({"name": "x"})).await);
        assert!(error.contains("no string 'type'"), "{error}");

        // Raw bytes that are not JSON at all.
        {
            let mut raw = FramedWrite::new(h.requests.get_mut(), frame_codec());
            raw.send(Bytes::from_static(b"\x00garbage")).await.unwrap();
        }
        let error = error_of(h.next().await);
        assert!(error.starts_with("malformed frame"), "{error}");

        let reply = h.roundtrip(json!({"type": "eval", "expr": "'still alive'"})).await;
        assert_eq!(value_of(reply), json!("still alive"));
    }

    #[tokio::test]
    async fn missing_set_handle_is_an_error_reply() {
        let mut h = start();
        h.next().await;

        let missing = h.dir.path().join("gone.json");
        let error = error_of(
            h.roundtrip(json!({"type": "set", "name": "x", "value": missing}))
                .await,
        );
        assert!(error.starts_with("OSError: scratch file I/O failed"), "{error}");
    }

    #[tokio::test]
    async fn quit_replies_then_exits() {
        let mut h = start();
        h.next().await;

        let reply = h.roundtrip(json!({"type": "quit"})).await;
        assert!(matches!(reply, Reply::Ok { handle: None }));
        h.worker.await.unwrap().unwrap();
        assert!(h.replies.next().await.is_none());
    }

    #[tokio::test]
    async fn closed_channel_ends_the_loop() {
        let mut h = start();
        h.next().await;
        h.requests.close().await.unwrap();
        h.worker.await.unwrap().unwrap();
    }

    struct Panicky;

    impl Interpreter for Panicky {
        fn describe(&self) -> String {
            "panicky".to_string()
        }
        fn exec(&mut self, _code: &str) -> Result<(), Failure> {
            panic!("boom");
        }
        fn eval(&mut self, _expr: &str) -> Result<Value, Failure> {
            Ok(json!(1))
        }
        fn call(&mut self, _: &Target, _: Vec<Value>, _: Map<String, Value>) -> Result<Value, Failure> {
            Ok(Value::Null)
        }
        fn get(&mut self, name: &str) -> Result<Value, Failure> {
            Err(Failure::key_error(name))
        }
        fn set(&mut self, _: &str, _: Value) -> Result<(), Failure> {
            Ok(())
        }
    }

    #[test]
    fn panics_become_failures() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::new(dir.path(), scratch::CHILD_PREFIX);
        let failure = dispatch_guarded(
            &mut Panicky,
            &scratch,
            Request::Exec {
                code: String::new(),
            },
        )
        .unwrap_err();
        assert_eq!(failure.render(), "Panic: boom");
    }
}
