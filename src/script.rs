//! Script records and the per-launch request built from them.

use crate::kind::{Capabilities, ScriptKind};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Mapping;
use std::fmt;
use std::path::{Path, PathBuf};

/// One launchable unit as stored in the catalog.
///
/// Names are unique within a category only. A runner never mutates the
/// descriptor it was given; saved defaults change through [`DefaultsUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    #[serde(deserialize_with = "scalar_text")]
    pub name: String,
    pub path: PathBuf,
    /// Name of the interpreter environment; only meaningful for interpreted scripts.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, rename = "script_type")]
    pub kind: ScriptKind,
    #[serde(flatten)]
    pub defaults: RunDefaults,
    /// Record keys this crate does not interpret (`tags`, `shortcut`, ...),
    /// written back unchanged. Must stay after `defaults`.
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Saved run settings for a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDefaults {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub arguments: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,
}

/// A YAML scalar read back as text.
///
/// Records inside flattened structs are buffered before they reach their
/// fields, which turns a plain `3.11` or `10` into a number. Names and
/// argument strings accept those as text.
struct Text(String);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TextVisitor).map(Text)
    }
}

struct TextVisitor;

impl Visitor<'_> for TextVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or a plain scalar")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(format!("{v:?}"))
    }
}

pub(crate) fn scalar_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Text::deserialize(deserializer).map(|text| text.0)
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Text>::deserialize(deserializer)?;
    Ok(value.map(|text| text.0).filter(|s| !s.trim().is_empty()))
}

impl ScriptDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ScriptKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            env: None,
            description: String::new(),
            category: String::new(),
            kind,
            defaults: RunDefaults::default(),
            extra: Mapping::new(),
        }
    }

    /// The directory containing the script, used as the default working directory.
    pub fn script_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }
}

/// Everything a runner needs for one launch besides the script itself.
///
/// Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Raw argument string, tokenized by the runner.
    pub arguments: String,
    /// Working directory override; the script's directory when `None`.
    pub working_dir: Option<PathBuf>,
    pub show_output: bool,
    pub interactive: bool,
    /// Transient replacement for the script's environment name.
    pub environment_override: Option<String>,
}

impl LaunchRequest {
    /// Builds a request from the script's saved defaults.
    pub fn from_defaults(script: &ScriptDescriptor) -> Self {
        let defaults = &script.defaults;
        Self {
            arguments: defaults.arguments.clone().unwrap_or_default(),
            working_dir: defaults.working_dir.as_ref().map(PathBuf::from),
            show_output: defaults.show_output.unwrap_or(false),
            interactive: defaults.interactive.unwrap_or(false),
            environment_override: None,
        }
    }

    /// Reconciles the display flags with each other and with what the kind
    /// supports: interactive input needs captured output, and kinds without
    /// output support always run detached.
    pub fn normalized(mut self, caps: Capabilities) -> Self {
        if self.interactive {
            self.show_output = true;
        }
        if !caps.supports_output {
            self.show_output = false;
        }
        if !caps.supports_interactive || !self.show_output {
            self.interactive = false;
        }
        self
    }
}

/// The saved-default changes produced by a launch when the user opted in.
///
/// The rules are deliberately asymmetric: the environment is written only
/// when an override differs from the stored value, the working directory
/// only when it differs from the script's own directory, and the display
/// flags whenever the kind supports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultsUpdate {
    pub env: Option<String>,
    pub arguments: Option<String>,
    pub working_dir: Option<String>,
    pub show_output: Option<bool>,
    pub interactive: Option<bool>,
}

impl DefaultsUpdate {
    pub fn from_request(script: &ScriptDescriptor, request: &LaunchRequest) -> Self {
        let caps = script.capabilities();
        let mut update = DefaultsUpdate::default();

        if caps.needs_environment {
            update.env = request
                .environment_override
                .clone()
                .filter(|env| Some(env) != script.env.as_ref());
        }

        if caps.supports_output || caps.supports_interactive {
            if !request.arguments.trim().is_empty() {
                update.arguments = Some(request.arguments.clone());
            }
            if let Some(dir) = &request.working_dir {
                if script.script_dir() != Some(dir.as_path()) {
                    update.working_dir = Some(dir.to_string_lossy().into_owned());
                }
            }
        }

        if caps.supports_output {
            update.show_output = Some(request.show_output);
        }
        if caps.supports_interactive {
            update.interactive = Some(request.interactive);
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        *self == DefaultsUpdate::default()
    }

    pub fn apply_to(self, script: &mut ScriptDescriptor) {
        if let Some(env) = self.env {
            script.env = Some(env);
        }
        let defaults = &mut script.defaults;
        if let Some(arguments) = self.arguments {
            defaults.arguments = Some(arguments);
        }
        if let Some(dir) = self.working_dir {
            defaults.working_dir = Some(dir);
        }
        if let Some(show) = self.show_output {
            defaults.show_output = Some(show);
        }
        if let Some(interactive) = self.interactive {
            defaults.interactive = Some(interactive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_script() -> ScriptDescriptor {
        let mut script =
            ScriptDescriptor::new("report", "/srv/tools/report.py", ScriptKind::Interpreted);
        script.env = Some("base".to_string());
        script
    }

    #[test]
    fn reads_catalog_record() {
        let yaml = r#"
name: report
path: /srv/tools/report.py
env: ""
description: nightly report
category: Tools
script_type: python
arguments: "--fast"
working_dir: ""
show_output: true
"#;
        let script: ScriptDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(script.kind, ScriptKind::Interpreted);
        assert_eq!(script.env, None);
        assert_eq!(script.defaults.arguments.as_deref(), Some("--fast"));
        assert_eq!(script.defaults.working_dir, None);
        assert_eq!(script.defaults.show_output, Some(true));
        assert_eq!(script.defaults.interactive, None);
    }

    #[test]
    fn unknown_record_keys_are_kept_apart_from_run_defaults() {
        let yaml = "name: 3.11\npath: /srv/a.py\narguments: 10\ntags: [nightly]\nshortcut: Ctrl+R\n";
        let script: ScriptDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(script.name, "3.11");
        assert_eq!(script.defaults.arguments.as_deref(), Some("10"));
        assert_eq!(script.extra.len(), 2);
        assert_eq!(script.extra.get("shortcut").and_then(|v| v.as_str()), Some("Ctrl+R"));

        let text = serde_yaml::to_string(&script).unwrap();
        assert_eq!(text.matches("arguments:").count(), 1);
        let again: ScriptDescriptor = serde_yaml::from_str(&text).unwrap();
        assert_eq!(again, script);
    }

    #[test]
    fn missing_type_defaults_to_python() {
        let script: ScriptDescriptor = serde_yaml::from_str("name: a\npath: /tmp/a.py\n").unwrap();
        assert_eq!(script.kind, ScriptKind::Interpreted);
        assert_eq!(script.category, "");
    }

    #[test]
    fn script_dir_of_bare_file_is_none() {
        let script = ScriptDescriptor::new("a", "a.py", ScriptKind::Interpreted);
        assert_eq!(script.script_dir(), None);
        assert_eq!(python_script().script_dir(), Some(Path::new("/srv/tools")));
    }

    #[test]
    fn normalization_couples_flags() {
        let caps = ScriptKind::Interpreted.capabilities();
        let req = LaunchRequest {
            interactive: true,
            ..Default::default()
        }
        .normalized(caps);
        assert!(req.show_output && req.interactive);

        let caps = ScriptKind::Executable.capabilities();
        let req = LaunchRequest {
            show_output: true,
            interactive: true,
            ..Default::default()
        }
        .normalized(caps);
        assert!(!req.show_output && !req.interactive);
    }

    #[test]
    fn update_skips_unchanged_environment_and_script_dir() {
        let script = python_script();
        let request = LaunchRequest {
            arguments: String::new(),
            working_dir: Some(PathBuf::from("/srv/tools")),
            show_output: false,
            interactive: false,
            environment_override: Some("base".to_string()),
        };
        let update = DefaultsUpdate::from_request(&script, &request);
        assert_eq!(update.env, None);
        assert_eq!(update.arguments, None);
        assert_eq!(update.working_dir, None);
        // Display flags are written even when unchanged.
        assert_eq!(update.show_output, Some(false));
        assert_eq!(update.interactive, Some(false));
    }

    #[test]
    fn update_records_changes() {
        let mut script = python_script();
        let request = LaunchRequest {
            arguments: "--since 2d".to_string(),
            working_dir: Some(PathBuf::from("/var/data")),
            show_output: true,
            interactive: true,
            environment_override: Some("venv".to_string()),
        };
        let update = DefaultsUpdate::from_request(&script, &request);
        assert!(!update.is_empty());
        update.apply_to(&mut script);
        assert_eq!(script.env.as_deref(), Some("venv"));
        assert_eq!(script.defaults.arguments.as_deref(), Some("--since 2d"));
        assert_eq!(script.defaults.working_dir.as_deref(), Some("/var/data"));
        assert_eq!(script.defaults.show_output, Some(true));
        assert_eq!(script.defaults.interactive, Some(true));
    }

    #[test]
    fn executables_save_nothing() {
        let script = ScriptDescriptor::new("app", "/opt/app/app.exe", ScriptKind::Executable);
        let request = LaunchRequest {
            arguments: "--x".to_string(),
            working_dir: Some(PathBuf::from("/tmp")),
            environment_override: Some("venv".to_string()),
            ..Default::default()
        };
        assert!(DefaultsUpdate::from_request(&script, &request).is_empty());
    }
}
