//! Script kinds and what each of them can do.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Category of a launchable script, selecting how it is started.
///
/// Serialized as the tag used in the catalog file (`python`, `batch`,
/// `powershell`, `executable`). Unknown tags are kept as [`ScriptKind::Other`]
/// so that runners registered at run time can claim them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScriptKind {
    /// A script run through an interpreter environment.
    #[default]
    Interpreted,
    /// A command-shell batch file.
    Batch,
    /// A PowerShell script.
    ShellScript,
    /// A native executable.
    Executable,
    /// Any other tag.
    Other(String),
}

/// Static description of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub display_name: &'static str,
    pub extensions: &'static [&'static str],
    pub needs_environment: bool,
    pub supports_output: bool,
    pub supports_interactive: bool,
}

const INTERPRETED: Capabilities = Capabilities {
    display_name: "Python script",
    extensions: &[".py"],
    needs_environment: true,
    supports_output: true,
    supports_interactive: true,
};

const BATCH: Capabilities = Capabilities {
    display_name: "Batch script",
    extensions: &[".bat", ".cmd"],
    needs_environment: false,
    supports_output: true,
    supports_interactive: true,
};

const SHELL_SCRIPT: Capabilities = Capabilities {
    display_name: "PowerShell script",
    extensions: &[".ps1", ".psm1", ".psd1"],
    needs_environment: false,
    supports_output: true,
    supports_interactive: true,
};

const EXECUTABLE: Capabilities = Capabilities {
    display_name: "Executable",
    extensions: &[".exe"],
    needs_environment: false,
    supports_output: false,
    supports_interactive: false,
};

// Registered extensions are assumed to handle their own streams.
const OTHER: Capabilities = Capabilities {
    display_name: "Custom",
    extensions: &[],
    needs_environment: false,
    supports_output: true,
    supports_interactive: true,
};

impl ScriptKind {
    /// The built-in kinds, in display order.
    pub const BUILTIN: [ScriptKind; 4] = [
        ScriptKind::Interpreted,
        ScriptKind::ShellScript,
        ScriptKind::Batch,
        ScriptKind::Executable,
    ];

    pub fn as_tag(&self) -> &str {
        match self {
            ScriptKind::Interpreted => "python",
            ScriptKind::Batch => "batch",
            ScriptKind::ShellScript => "powershell",
            ScriptKind::Executable => "executable",
            ScriptKind::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "python" => ScriptKind::Interpreted,
            "batch" => ScriptKind::Batch,
            "powershell" => ScriptKind::ShellScript,
            "executable" => ScriptKind::Executable,
            other => ScriptKind::Other(other.to_string()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            ScriptKind::Interpreted => INTERPRETED,
            ScriptKind::Batch => BATCH,
            ScriptKind::ShellScript => SHELL_SCRIPT,
            ScriptKind::Executable => EXECUTABLE,
            ScriptKind::Other(_) => OTHER,
        }
    }

    /// Guesses the kind from a file extension, falling back to
    /// [`ScriptKind::Interpreted`].
    pub fn detect(path: &Path) -> Self {
        let ext = match path.extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy().to_lowercase()),
            None => return ScriptKind::Interpreted,
        };
        Self::BUILTIN
            .into_iter()
            .find(|kind| kind.capabilities().extensions.contains(&ext.as_str()))
            .unwrap_or(ScriptKind::Interpreted)
    }
}

impl From<String> for ScriptKind {
    fn from(tag: String) -> Self {
        ScriptKind::from_tag(&tag)
    }
}

impl From<ScriptKind> for String {
    fn from(kind: ScriptKind) -> Self {
        kind.as_tag().to_string()
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}
