//! Field completion: an injected capability that fills the null fields of a
//! heuristic partial analysis from the raw rows.
//!
//! A completer may be slow, fail or answer with garbage. Callers bound it with
//! [`with_timeout`] and pass whatever comes back through [`reconcile`], which
//! enforces the fill-only contract: values the heuristics already produced
//! are never replaced and never erased.

use std::{
    io::{Read, Write},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, warn};
use serde_json::json;

use crate::{
    analysis::AnalysisKind,
    document::{Document, Value},
    error::CompleterError,
};

pub trait FieldCompleter: Send + Sync {
    fn complete(
        &self,
        partial: &Document,
        rows: &[Document],
        kind: AnalysisKind,
    ) -> Result<Document, CompleterError>;
}

/// Returns the partial unchanged. Used when no completer is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCompleter;

impl FieldCompleter for PassthroughCompleter {
    fn complete(
        &self,
        partial: &Document,
        _rows: &[Document],
        _kind: AnalysisKind,
    ) -> Result<Document, CompleterError> {
        Ok(partial.clone())
    }
}

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs an external program per call. The request `{kind, partial, rows}` is
/// written to its stdin as JSON; stdout must hold a single JSON object.
#[derive(Debug, Clone)]
pub struct CommandCompleter {
    program: String,
    args: Vec<String>,
    deadline: Option<Duration>,
}

impl CommandCompleter {
    /// `command[0]` is the program, the rest are its arguments. Returns
    /// `None` for an empty command.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            deadline: None,
        })
    }

    /// Kills the program when it has not exited within `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Waits for `child`, killing and reaping it once `deadline` has passed.
fn wait_until(child: &mut Child, deadline: Duration) -> Result<ExitStatus, CompleterError> {
    let expires = Instant::now() + deadline;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= expires {
            if let Err(err) = child.kill() {
                warn!("Could not kill completer process {}: {err}", child.id());
            }
            let _ = child.wait();
            debug!("Killed completer process {} after {deadline:?}", child.id());
            return Err(CompleterError::Timeout(deadline));
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

impl FieldCompleter for CommandCompleter {
    fn complete(
        &self,
        partial: &Document,
        rows: &[Document],
        kind: AnalysisKind,
    ) -> Result<Document, CompleterError> {
        let request = json!({ "kind": kind, "partial": partial, "rows": rows });
        let payload = serde_json::to_vec(&request)
            .map_err(|err| CompleterError::Malformed(format!("encoding request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompleterError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Every pipe gets its own thread so a chatty child cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            })
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Pipe threads of a killed child are detached: a grandchild may still
        // hold the pipes open.
        let status = match self.deadline {
            Some(deadline) => wait_until(&mut child, deadline)?,
            None => child.wait()?,
        };
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let (stdout, stderr) = (collect(stdout), collect(stderr));

        if !status.success() {
            return Err(CompleterError::Exit {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        let reply: serde_json::Value = serde_json::from_slice(&stdout)
            .map_err(|err| CompleterError::Malformed(err.to_string()))?;
        match Value::from(reply) {
            Value::Document(doc) => Ok(doc),
            other => Err(CompleterError::Malformed(format!(
                "expected a JSON object, found {}",
                other.kind()
            ))),
        }
    }
}

/// Wraps a completer so each call gives up after `timeout`.
pub struct TimeoutCompleter {
    inner: Arc<dyn FieldCompleter>,
    timeout: Duration,
}

pub fn with_timeout(inner: Arc<dyn FieldCompleter>, timeout: Duration) -> TimeoutCompleter {
    TimeoutCompleter { inner, timeout }
}

impl FieldCompleter for TimeoutCompleter {
    fn complete(
        &self,
        partial: &Document,
        rows: &[Document],
        kind: AnalysisKind,
    ) -> Result<Document, CompleterError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let partial = partial.clone();
        let rows = rows.to_vec();
        let started = Instant::now();

        // A timed-out worker is left to finish on its own; its reply is dropped.
        // Completers that own a process bound it themselves (see
        // `CommandCompleter::with_deadline`).
        thread::spawn(move || {
            let _ = tx.send(inner.complete(&partial, &rows, kind));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                debug!("Completer answered in {:?}", started.elapsed());
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("Completer timed out after {:?}", self.timeout);
                Err(CompleterError::Timeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CompleterError::Disconnected),
        }
    }
}

/// Combines a completer reply with the partial it was given.
///
/// Every non-vacant value of `partial` survives unchanged. Vacant slots
/// (null or an empty list) take the completed value when it is non-null.
/// Nested documents are reconciled field by field.
pub fn reconcile(partial: &Document, completed: &Document) -> Document {
    let mut result = partial.clone();
    for (key, filled) in completed.iter() {
        let next = match (partial.get(key), filled) {
            (_, Value::Null) => continue,
            (Some(Value::Document(ours)), Value::Document(theirs)) => {
                Value::Document(reconcile(ours, theirs))
            }
            (Some(ours), _) if !ours.is_vacant() => continue,
            (_, other) => other.clone(),
        };
        result.insert(key.clone(), next);
    }
    result
}
