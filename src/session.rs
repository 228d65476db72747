//! A started script process and its captured output.
//!
//! Each captured stream gets a reader thread that splits the pipe into lines
//! and pushes them onto a channel. The owning thread drains those channels
//! without blocking; nothing the reader threads do ever touches the consumer
//! directly.

use crate::command::Attachment;
use crate::error::StreamError;
use crate::external::{self, ExitCode};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn name(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// One line of output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Lifecycle of a session. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// The process exited on its own; `None` when the status could not be read.
    Finished(Option<ExitCode>),
    /// The consumer is done with the session, or terminated it.
    Closed,
}

struct LineReader {
    lines: Receiver<String>,
    handle: JoinHandle<()>,
}

/// A launched process plus the plumbing to observe it.
///
/// Detached sessions own the child only; captured sessions additionally own
/// one reader per output stream and, when interactive, the child's stdin.
/// Dropping a session never kills the process; it only collects the exit
/// status of one that is already gone.
pub struct ProcessSession {
    name: String,
    child: Child,
    attachment: Attachment,
    stdin: Option<ChildStdin>,
    stdout: Option<LineReader>,
    stderr: Option<LineReader>,
    stop: Arc<AtomicBool>,
    state: SessionState,
}

impl ProcessSession {
    pub fn new(mut child: Child, attachment: Attachment, name: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map(|pipe| LineReader::spawn(pipe, StreamKind::Stdout, stop.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| LineReader::spawn(pipe, StreamKind::Stderr, stop.clone()));

        Self {
            name: name.to_string(),
            child,
            attachment,
            stdin,
            stdout,
            stderr,
            stop,
            state: SessionState::Running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn attachment(&self) -> Attachment {
        self.attachment
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.attachment, Attachment::Captured { .. })
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.attachment, Attachment::Captured { interactive: true })
    }

    /// Current state, without checking the process.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Checks whether the process has exited, without blocking.
    pub fn poll(&mut self) -> SessionState {
        if self.state == SessionState::Running {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    let code = external::exit_code(status);
                    info!(name = %self.name, pid = self.child.id(), code, "process finished");
                    self.state = SessionState::Finished(Some(code));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(name = %self.name, error = %err, "cannot query process status");
                    self.state = SessionState::Finished(None);
                }
            }
        }
        self.state
    }

    pub fn is_running(&mut self) -> bool {
        self.poll() == SessionState::Running
    }

    /// Takes every line queued so far: stdout lines first, then stderr lines,
    /// each in arrival order. Never blocks.
    pub fn drain(&mut self) -> Vec<OutputLine> {
        let mut out = Vec::new();
        for (reader, stream) in [
            (&self.stdout, StreamKind::Stdout),
            (&self.stderr, StreamKind::Stderr),
        ] {
            let Some(reader) = reader else { continue };
            loop {
                match reader.lines.try_recv() {
                    Ok(text) => out.push(OutputLine { stream, text }),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
        }
        out
    }

    /// Whether every reader has reached end of stream, so that a following
    /// [`drain`](Self::drain) sees everything the process wrote. Never blocks.
    ///
    /// A grandchild holding a pipe open can keep a reader alive past the
    /// process exit.
    pub fn readers_finished(&self) -> bool {
        [&self.stdout, &self.stderr]
            .into_iter()
            .flatten()
            .all(|reader| reader.handle.is_finished())
    }

    /// Writes `text` plus a newline to the process, if it accepts input.
    ///
    /// Returns whether the line was delivered. Failures are logged and
    /// otherwise ignored.
    pub fn send_input(&mut self, text: &str) -> bool {
        if self.poll() != SessionState::Running {
            return false;
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return false;
        };
        let line = format!("{text}\n");
        let written = stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush());
        match written {
            Ok(()) => true,
            Err(err) => {
                debug!(name = %self.name, error = %StreamError::InputWrite(err), "input dropped");
                false
            }
        }
    }

    /// Asks the process to stop and closes the session.
    ///
    /// Best effort: termination errors are logged, never returned, and the
    /// call does not wait for the process to exit.
    pub fn terminate(&mut self) {
        self.terminate_with(request_stop);
    }

    fn terminate_with(&mut self, stop: impl FnOnce(&mut Child) -> io::Result<()>) {
        self.stop.store(true, Ordering::Relaxed);
        self.stdin = None;
        if self.poll() == SessionState::Running {
            info!(name = %self.name, pid = self.child.id(), "terminating process");
            match stop(&mut self.child) {
                Ok(()) => self.reap(),
                Err(err) => warn!(name = %self.name, error = %err, "failed to terminate process"),
            }
        }
        self.state = SessionState::Closed;
    }

    /// Collects the exit status if the process is already gone, so it does
    /// not linger in the process table.
    fn reap(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => debug!(name = %self.name, "process reaped"),
            Ok(None) => {}
            Err(err) => debug!(name = %self.name, error = %err, "cannot reap process"),
        }
    }

    /// Marks the session as consumed. The process, if still alive, keeps
    /// running.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.stdin = None;
        self.state = SessionState::Closed;
    }

    /// Blocks until the process exits.
    pub fn wait(&mut self) -> SessionState {
        if self.state == SessionState::Running {
            self.state = match self.child.wait() {
                Ok(status) => SessionState::Finished(Some(external::exit_code(status))),
                Err(err) => {
                    warn!(name = %self.name, error = %err, "cannot wait for process");
                    SessionState::Finished(None)
                }
            };
        }
        self.state
    }
}

impl LineReader {
    fn spawn<R>(pipe: R, stream: StreamKind, stop: Arc<AtomicBool>) -> Self
    where
        R: Read + Send + 'static,
    {
        let (sender, lines) = channel();
        let handle = thread::spawn(move || read_lines(pipe, stream, sender, stop));
        Self { lines, handle }
    }
}

fn read_lines<R: Read>(pipe: R, stream: StreamKind, sender: Sender<String>, stop: Arc<AtomicBool>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if sender.send(strip_line(&buf)).is_err() {
                    break;
                }
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(source) => {
                let err = StreamError::Read {
                    stream: stream.name(),
                    source,
                };
                warn!(error = %err, "output reader stopped");
                break;
            }
        }
    }
}

fn strip_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.reap();
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id()).map_err(|_| io::Error::other("pid out of range"))?;
    // SAFETY: kill has no memory-safety preconditions; pid belongs to our child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.kill()
}
