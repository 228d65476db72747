use crate::env::EnvironmentRegistry;
use crate::error::Result;
use crate::external;
use crate::script::{LaunchRequest, ScriptDescriptor};
use crate::session::ProcessSession;
use std::path::PathBuf;

/// How a spawned process is connected to the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// stdout and stderr are piped and read line by line; stdin is piped
    /// only for interactive sessions. No console window is created.
    Captured { interactive: bool },
    /// The process keeps its own streams.
    Detached(DetachedConsole),
}

/// Stream and window policy for a process whose output is not shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedConsole {
    /// Output is discarded and no window is created.
    Headless,
    /// Streams are inherited but no window is created; the script hides itself.
    Hidden,
    /// Streams are inherited and, on Windows, a fresh console is opened.
    OwnConsole,
}

/// Object-safe capability shared by every script kind: build a command line
/// and start it.
pub trait ScriptRunner {
    /// The script this runner was created for.
    fn script(&self) -> &ScriptDescriptor;

    /// Builds the argv for a launch, arguments included.
    fn prepare_command(&self, request: &LaunchRequest) -> Result<Vec<String>>;

    /// Console policy used when output is not shown.
    fn detached_console(&self) -> DetachedConsole;

    /// Picks the attachment mode for a (normalized) request.
    fn attachment(&self, request: &LaunchRequest) -> Attachment {
        if request.show_output {
            Attachment::Captured {
                interactive: request.interactive,
            }
        } else {
            Attachment::Detached(self.detached_console())
        }
    }

    /// Working directory for a request, defaulting to the script's directory.
    fn working_dir(&self, request: &LaunchRequest) -> Option<PathBuf> {
        request
            .working_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .or_else(|| self.script().script_dir().map(PathBuf::from))
    }

    /// Starts the script.
    ///
    /// Every error is raised before a process exists, except for the spawn
    /// itself, which either yields a live session or fails without a child.
    fn run(&self, request: &LaunchRequest) -> Result<ProcessSession> {
        let request = request.clone().normalized(self.script().capabilities());
        let argv = self.prepare_command(&request)?;
        let attachment = self.attachment(&request);
        let cwd = self.working_dir(&request);
        let child = external::spawn(&argv, cwd.as_deref(), attachment)?;
        Ok(ProcessSession::new(child, attachment, &self.script().name))
    }
}

/// Creates a runner for a script; one factory is registered per script kind.
///
/// Implemented for the built-in runners and for any matching closure, so new
/// kinds can be added without touching the existing ones.
pub trait RunnerFactory: Send + Sync {
    fn create(
        &self,
        script: ScriptDescriptor,
        environments: &EnvironmentRegistry,
    ) -> Box<dyn ScriptRunner>;
}

impl<F> RunnerFactory for F
where
    F: Fn(ScriptDescriptor, &EnvironmentRegistry) -> Box<dyn ScriptRunner> + Send + Sync,
{
    fn create(
        &self,
        script: ScriptDescriptor,
        environments: &EnvironmentRegistry,
    ) -> Box<dyn ScriptRunner> {
        self(script, environments)
    }
}
