//! Built-in runners, one per script kind.

use crate::command::{DetachedConsole, RunnerFactory, ScriptRunner};
use crate::env::EnvironmentRegistry;
use crate::error::{LaunchError, Result};
use crate::kind::ScriptKind;
use crate::lexer::split_arguments;
use crate::registry::Factory;
use crate::script::{LaunchRequest, ScriptDescriptor};

/// Runners known to the launcher at compile time.
pub(crate) trait BuiltinRunner: ScriptRunner + Sized + 'static {
    /// The kind this runner is registered for.
    fn kind() -> ScriptKind;

    fn new(script: ScriptDescriptor, environments: &EnvironmentRegistry) -> Self;
}

impl<T: BuiltinRunner> RunnerFactory for Factory<T> {
    fn create(
        &self,
        script: ScriptDescriptor,
        environments: &EnvironmentRegistry,
    ) -> Box<dyn ScriptRunner> {
        Box::new(T::new(script, environments))
    }
}

/// Host family deciding the shell wrappers and window flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Host {
    Windows,
    Other,
}

impl Host {
    fn current() -> Self {
        if cfg!(windows) {
            Host::Windows
        } else {
            Host::Other
        }
    }
}

fn path_arg(script: &ScriptDescriptor) -> String {
    script.path.to_string_lossy().into_owned()
}

fn with_arguments(mut argv: Vec<String>, request: &LaunchRequest) -> Result<Vec<String>> {
    argv.extend(split_arguments(&request.arguments)?);
    Ok(argv)
}

/// Runs a script through a named interpreter environment.
pub struct InterpretedRunner {
    script: ScriptDescriptor,
    environments: EnvironmentRegistry,
}

impl BuiltinRunner for InterpretedRunner {
    fn kind() -> ScriptKind {
        ScriptKind::Interpreted
    }

    fn new(script: ScriptDescriptor, environments: &EnvironmentRegistry) -> Self {
        Self {
            script,
            environments: environments.clone(),
        }
    }
}

impl ScriptRunner for InterpretedRunner {
    fn script(&self) -> &ScriptDescriptor {
        &self.script
    }

    fn prepare_command(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        let name = self
            .script
            .env
            .as_deref()
            .ok_or_else(|| LaunchError::MissingEnvironment {
                script: self.script.name.clone(),
            })?;
        let env = self
            .environments
            .get(name)
            .ok_or_else(|| LaunchError::EnvironmentNotFound {
                name: name.to_string(),
            })?;
        let argv = vec![env.path.to_string_lossy().into_owned(), path_arg(&self.script)];
        with_arguments(argv, request)
    }

    fn detached_console(&self) -> DetachedConsole {
        DetachedConsole::Headless
    }
}

/// Runs a batch file, through `cmd /c` where that shell exists.
pub struct BatchRunner {
    script: ScriptDescriptor,
    host: Host,
}

impl BuiltinRunner for BatchRunner {
    fn kind() -> ScriptKind {
        ScriptKind::Batch
    }

    fn new(script: ScriptDescriptor, _environments: &EnvironmentRegistry) -> Self {
        Self {
            script,
            host: Host::current(),
        }
    }
}

impl ScriptRunner for BatchRunner {
    fn script(&self) -> &ScriptDescriptor {
        &self.script
    }

    fn prepare_command(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        let argv = match self.host {
            Host::Windows => vec!["cmd".to_string(), "/c".to_string(), path_arg(&self.script)],
            Host::Other => vec![path_arg(&self.script)],
        };
        with_arguments(argv, request)
    }

    fn detached_console(&self) -> DetachedConsole {
        DetachedConsole::OwnConsole
    }
}

/// Runs a PowerShell script with `-File`.
pub struct ShellScriptRunner {
    script: ScriptDescriptor,
    host: Host,
}

impl BuiltinRunner for ShellScriptRunner {
    fn kind() -> ScriptKind {
        ScriptKind::ShellScript
    }

    fn new(script: ScriptDescriptor, _environments: &EnvironmentRegistry) -> Self {
        Self {
            script,
            host: Host::current(),
        }
    }
}

impl ScriptRunner for ShellScriptRunner {
    fn script(&self) -> &ScriptDescriptor {
        &self.script
    }

    fn prepare_command(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        let prefix: &[&str] = match self.host {
            Host::Windows => &["powershell", "-NoProfile", "-ExecutionPolicy", "Bypass"],
            Host::Other => &["pwsh", "-NoProfile"],
        };
        let mut argv: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();

        if !request.show_output {
            // -WindowStyle is only understood by Windows PowerShell.
            if self.host == Host::Windows {
                argv.extend(["-WindowStyle".to_string(), "Hidden".to_string()]);
            }
            argv.push("-NonInteractive".to_string());
        }
        argv.extend(["-File".to_string(), path_arg(&self.script)]);
        with_arguments(argv, request)
    }

    fn detached_console(&self) -> DetachedConsole {
        DetachedConsole::Hidden
    }
}

/// Runs a native executable directly. Executables always keep their own
/// console; their output is never captured.
pub struct ExecutableRunner {
    script: ScriptDescriptor,
}

impl BuiltinRunner for ExecutableRunner {
    fn kind() -> ScriptKind {
        ScriptKind::Executable
    }

    fn new(script: ScriptDescriptor, _environments: &EnvironmentRegistry) -> Self {
        Self { script }
    }
}

impl ScriptRunner for ExecutableRunner {
    fn script(&self) -> &ScriptDescriptor {
        &self.script
    }

    fn prepare_command(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        with_arguments(vec![path_arg(&self.script)], request)
    }

    fn detached_console(&self) -> DetachedConsole {
        DetachedConsole::OwnConsole
    }
}
