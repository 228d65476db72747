//! Interpreter health checks.

use crate::error::ProbeError;
use crate::external::hide_console;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Timeout used for the explicit environment test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Package listing can be slow on large environments.
const PACKAGES_TIMEOUT: Duration = Duration::from_secs(60);

const UNAVAILABLE: &str = "unavailable";

/// Version and installed packages of an interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub version: String,
    pub packages: String,
}

/// Collected output of a finished probe.
#[derive(Debug)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    /// Some interpreters report on stderr instead of stdout.
    fn text(&self) -> String {
        let out = self.stdout.trim();
        if out.is_empty() {
            self.stderr.trim().to_string()
        } else {
            out.to_string()
        }
    }
}

/// Asks the interpreter at `path` for its version and package list.
///
/// Never fails: if the interpreter cannot be run, the returned info carries
/// a sentinel version and the error text in place of the package list.
pub fn get_python_info(path: &Path) -> InterpreterInfo {
    let probe = || -> Result<InterpreterInfo, ProbeError> {
        let version = run_captured(path, &["--version"], TEST_TIMEOUT)?.text();
        let packages = run_captured(path, &["-m", "pip", "list"], PACKAGES_TIMEOUT)?.text();
        Ok(InterpreterInfo { version, packages })
    };
    probe().unwrap_or_else(|err| {
        debug!(path = %path.display(), error = %err, "interpreter probe failed");
        InterpreterInfo {
            version: UNAVAILABLE.to_string(),
            packages: format!("error: {err}"),
        }
    })
}

/// Runs `<path> --version` with a timeout and returns what it printed.
pub fn test_environment(path: &Path, timeout: Duration) -> Result<String, ProbeError> {
    Ok(run_captured(path, &["--version"], timeout)?.text())
}

fn run_captured(program: &Path, args: &[&str], timeout: Duration) -> Result<Captured, ProbeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    hide_console(&mut cmd);

    let mut child = cmd.spawn().map_err(ProbeError::Spawn)?;
    let stdout = child.stdout.take().map(collect);
    let stderr = child.stderr.take().map(collect);

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().map_err(ProbeError::Wait)? {
            Some(_) => break,
            None if Instant::now() >= deadline => {
                // The process may have exited in between; nothing more to do then.
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProbeError::Timeout { timeout });
            }
            None => thread::sleep(Duration::from_millis(10)),
        }
    }

    Ok(Captured {
        stdout: joined(stdout)?,
        stderr: joined(stderr)?,
    })
}

fn collect<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn joined(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<String, ProbeError> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| ProbeError::Wait(std::io::Error::other("output reader panicked")))?
        .map_err(ProbeError::Wait)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
