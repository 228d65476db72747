//! Launching catalogued scripts as child processes.
//!
//! Scripts of several kinds (interpreted, batch, PowerShell, native
//! executables) are described by [`ScriptDescriptor`] records kept in a YAML
//! [`Catalog`]. A [`Launcher`] picks the runner registered for a script's
//! kind, builds the command line and starts the process. With output shown,
//! the resulting [`ProcessSession`] captures stdout and stderr line by line
//! on background threads, and an [`OutputPump`] moves those lines to a
//! display on a fixed interval.
//!
//! New script kinds are added by registering a [`RunnerFactory`] with the
//! [`RunnerRegistry`].

pub mod catalog;
pub mod command;
pub mod env;
pub mod error;
pub mod external;
pub mod kind;
mod launcher;
pub mod lexer;
pub mod logging;
pub mod probe;
pub mod pump;
mod registry;
mod runners;
pub mod script;
pub mod session;

pub use catalog::Catalog;
pub use command::{RunnerFactory, ScriptRunner};
pub use env::{EnvironmentDescriptor, EnvironmentRegistry};
pub use error::LaunchError;
pub use kind::ScriptKind;
pub use launcher::Launcher;
pub use pump::{OutputPump, OutputSink};
pub use registry::RunnerRegistry;
pub use script::{DefaultsUpdate, LaunchRequest, ScriptDescriptor};
pub use session::ProcessSession;
