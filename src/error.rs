use crate::kind::ScriptKind;
use crate::lexer::TokenizeError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while constructing a launch. All of them surface synchronously
/// from the launch call and no process is left behind.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to parse arguments: {0}")]
    Tokenize(#[from] TokenizeError),

    #[error("failed to resolve environment: no environment named '{name}'")]
    EnvironmentNotFound { name: String },

    #[error("failed to resolve environment: script '{script}' has no environment selected")]
    MissingEnvironment { script: String },

    #[error("failed to select runner: unsupported script type '{kind}'")]
    UnsupportedKind { kind: ScriptKind },

    #[error("failed to start '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LaunchError>;

/// Errors inside a running session. Never returned to the launcher's caller;
/// they are logged and the affected reader or write simply stops.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("reading {stream} failed: {source}")]
    Read {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("writing input failed: {0}")]
    InputWrite(#[source] io::Error),
}

/// Failures of the interpreter probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to collect interpreter output: {0}")]
    Wait(#[source] io::Error),
}

/// Failures of the catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot serialize catalog: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("no script named '{name}'")]
    ScriptNotFound { name: String },

    #[error("script name '{name}' exists in several categories ({}); pick one", .categories.join(", "))]
    AmbiguousScript {
        name: String,
        categories: Vec<String>,
    },

    #[error("a script named '{name}' already exists in category '{category}'")]
    DuplicateScript { name: String, category: String },

    #[error("an environment named '{name}' already exists")]
    EnvironmentExists { name: String },

    #[error("no environment named '{name}'")]
    EnvironmentMissing { name: String },

    #[error("a category named '{name}' already exists")]
    CategoryExists { name: String },

    #[error("no category named '{name}'")]
    CategoryMissing { name: String },

    #[error("'{name}' is the default category and cannot be removed")]
    DefaultCategory { name: String },

    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },
}
