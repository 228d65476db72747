//! The one place where child processes are created.
//!
//! Every spawn goes through [`configure`], which sets the stream attachment
//! and the host window flags explicitly on the [`Command`] instead of relying
//! on any process-wide default.

use crate::command::{Attachment, DetachedConsole};
use crate::error::{LaunchError, Result};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, info};

/// Conventional process exit code type.
pub type ExitCode = i32;

#[cfg(windows)]
mod flags {
    pub const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
    pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;
}

/// Builds a [`Command`] for `argv` with the given attachment.
///
/// Returns `None` for an empty argv.
pub fn configure(argv: &[String], cwd: Option<&Path>, attachment: Attachment) -> Option<Command> {
    let (program, args) = argv.split_first()?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    match attachment {
        Attachment::Captured { interactive } => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            cmd.stdin(if interactive {
                Stdio::piped()
            } else {
                Stdio::null()
            });
            hide_console(&mut cmd);
        }
        Attachment::Detached(DetachedConsole::Headless) => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            hide_console(&mut cmd);
        }
        Attachment::Detached(DetachedConsole::Hidden) => {
            hide_console(&mut cmd);
        }
        Attachment::Detached(DetachedConsole::OwnConsole) => {
            new_console(&mut cmd);
        }
    }
    Some(cmd)
}

/// Spawns `argv` without waiting for it.
pub fn spawn(argv: &[String], cwd: Option<&Path>, attachment: Attachment) -> Result<Child> {
    let program = argv.first().cloned().unwrap_or_default();
    let mut cmd = configure(argv, cwd, attachment).ok_or_else(|| LaunchError::ProcessSpawn {
        program: program.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
    })?;

    debug!(?argv, cwd = ?cwd, ?attachment, "spawning process");
    let child = cmd
        .spawn()
        .map_err(|source| LaunchError::ProcessSpawn { program, source })?;
    info!(pid = child.id(), "process started");
    Ok(child)
}

/// Keeps a console window from flashing up for the child.
///
/// Only the creation flag is set. `std` does not expose `STARTUPINFO`, so
/// `wShowWindow = SW_HIDE` is left to the flag's effect.
#[cfg(windows)]
pub fn hide_console(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.creation_flags(flags::CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
pub fn hide_console(_cmd: &mut Command) {}

#[cfg(windows)]
fn new_console(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.creation_flags(flags::CREATE_NEW_CONSOLE);
}

#[cfg(not(windows))]
fn new_console(_cmd: &mut Command) {}

/// Maps an exit status to a shell-style exit code.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}
