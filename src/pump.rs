//! Periodic transfer of session output to a display.

use crate::session::{OutputLine, ProcessSession, SessionState};
use std::thread;
use std::time::{Duration, Instant};

/// Receives what the pump moves out of a session.
pub trait OutputSink {
    fn line(&mut self, line: &OutputLine);

    /// Called with every line of input that reached the process.
    fn input_echo(&mut self, _text: &str) {}

    /// Called once, after the final drain of a finished process.
    fn finished(&mut self, _state: SessionState) {}
}

impl OutputSink for Vec<OutputLine> {
    fn line(&mut self, line: &OutputLine) {
        self.push(line.clone());
    }
}

/// Drives a [`ProcessSession`] on a fixed interval: drain queued lines into
/// a sink, check for exit, and after exit drain once more and close.
///
/// No step blocks. After the process exits the pump keeps ticking until both
/// readers reach end of stream or [`DRAIN_TIMEOUT`](Self::DRAIN_TIMEOUT)
/// passes, whichever comes first.
pub struct OutputPump {
    session: ProcessSession,
    interval: Duration,
    exited: Option<(SessionState, Instant)>,
}

impl OutputPump {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    /// How long output is still collected after the process exited.
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(session: ProcessSession) -> Self {
        Self::with_interval(session, Self::DEFAULT_INTERVAL)
    }

    pub fn with_interval(session: ProcessSession, interval: Duration) -> Self {
        Self {
            session,
            interval,
            exited: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn session(&self) -> &ProcessSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ProcessSession {
        &mut self.session
    }

    /// One pump step. Returns `false` once the session is closed.
    pub fn tick(&mut self, sink: &mut dyn OutputSink) -> bool {
        if self.session.state() == SessionState::Closed {
            return false;
        }
        self.forward(sink);

        let (state, deadline) = match self.exited {
            Some(exited) => exited,
            None => match self.session.poll() {
                SessionState::Running => return true,
                state => {
                    let exited = (state, Instant::now() + Self::DRAIN_TIMEOUT);
                    self.exited = Some(exited);
                    exited
                }
            },
        };
        if !self.session.readers_finished() && Instant::now() < deadline {
            return true;
        }

        self.forward(sink);
        self.session.close();
        sink.finished(state);
        false
    }

    /// Ticks until the session closes.
    pub fn run(&mut self, sink: &mut dyn OutputSink) {
        while self.tick(sink) {
            thread::sleep(self.interval);
        }
    }

    /// Sends a line of input and echoes it to the sink when delivered.
    pub fn send_input(&mut self, text: &str, sink: &mut dyn OutputSink) -> bool {
        let sent = self.session.send_input(text);
        if sent {
            sink.input_echo(text);
        }
        sent
    }

    /// Closes the display. A running process is terminated only when
    /// `confirm` agrees; otherwise nothing changes and `false` is returned.
    pub fn request_close(&mut self, confirm: impl FnOnce() -> bool) -> bool {
        if self.session.is_running() {
            if !confirm() {
                return false;
            }
            self.session.terminate();
        } else {
            self.session.close();
        }
        true
    }

    fn forward(&mut self, sink: &mut dyn OutputSink) {
        for line in self.session.drain() {
            sink.line(&line);
        }
    }
}
