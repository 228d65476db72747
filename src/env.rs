use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::PathBuf;

/// A named interpreter installation that interpreted scripts run under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    /// Display name, unique within the registry.
    #[serde(deserialize_with = "crate::script::scalar_text")]
    pub name: String,
    /// Path to the interpreter executable.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Keys such as `packages` or `is_default`, kept for other tools.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: String::new(),
            extra: Mapping::new(),
        }
    }
}

/// Lookup table of interpreter environments, keyed by display name.
///
/// References from scripts are resolved lazily: a dangling name is only an
/// error when a launch actually needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentRegistry {
    entries: Vec<EnvironmentDescriptor>,
}

impl EnvironmentRegistry {
    pub fn new(entries: Vec<EnvironmentDescriptor>) -> Self {
        Self { entries }
    }

    /// Get an environment by its display name.
    pub fn get(&self, name: &str) -> Option<&EnvironmentDescriptor> {
        self.entries.iter().find(|env| env.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EnvironmentDescriptor> {
        self.entries.iter_mut().find(|env| env.name == name)
    }

    /// Insert an environment, replacing one with the same name.
    ///
    /// Returns the replaced entry, if any.
    pub fn insert(&mut self, env: EnvironmentDescriptor) -> Option<EnvironmentDescriptor> {
        match self.entries.iter_mut().find(|e| e.name == env.name) {
            Some(slot) => Some(std::mem::replace(slot, env)),
            None => {
                self.entries.push(env);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<EnvironmentDescriptor> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentDescriptor> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
