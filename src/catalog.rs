//! The YAML catalog of scripts, environments and settings.

use crate::env::{EnvironmentDescriptor, EnvironmentRegistry};
use crate::error::CatalogError;
use crate::script::{DefaultsUpdate, ScriptDescriptor};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the catalog location.
pub const CONFIG_ENV_VAR: &str = "SCRIPT_LAUNCHER_CONFIG";

const CONFIG_FILE_NAME: &str = "script_launcher_config.yaml";
const BACKUP_DIR_NAME: &str = "script_launcher_backups";
const CURRENT_VERSION: &str = "1.0";
const FOOTER: &str = "\n# Script launcher catalog.\n# Do not edit the version field by hand.\n";

pub type Result<T> = std::result::Result<T, CatalogError>;

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "crate::script::scalar_text")]
    pub default_category: String,
    #[serde(deserialize_with = "crate::script::scalar_text")]
    pub default_environment: String,
    pub backup_enabled: bool,
    pub backup_path: PathBuf,
    pub last_directory: PathBuf,
    /// Display order of categories. Categories not listed follow in name order.
    pub category_order: Vec<String>,
    /// Settings of other tools sharing the file, such as `window_size`.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_category: "Other".to_string(),
            default_environment: String::new(),
            backup_enabled: true,
            backup_path: home().join(BACKUP_DIR_NAME),
            last_directory: home(),
            category_order: Vec::new(),
            extra: Mapping::new(),
        }
    }
}

/// Scripts grouped by category, the environment registry and settings,
/// bound to the file they were loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    #[serde(deserialize_with = "crate::script::scalar_text")]
    pub version: String,
    scripts: BTreeMap<String, Vec<ScriptDescriptor>>,
    python_environments: EnvironmentRegistry,
    pub settings: Settings,
    #[serde(flatten)]
    extra: Mapping,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Catalog {
    fn default() -> Self {
        let mut catalog = Self {
            version: CURRENT_VERSION.to_string(),
            scripts: BTreeMap::new(),
            python_environments: EnvironmentRegistry::default(),
            settings: Settings::default(),
            extra: Mapping::new(),
            path: PathBuf::new(),
        };
        catalog.ensure_structure();
        catalog
    }
}

impl Catalog {
    /// `$SCRIPT_LAUNCHER_CONFIG`, or the catalog file in the home directory.
    pub fn default_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => home().join(CONFIG_FILE_NAME),
        }
    }

    /// Reads the catalog at `path`. The file must exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        let mut catalog = if text.trim().is_empty() {
            Catalog::default()
        } else {
            serde_yaml::from_str::<Catalog>(&text).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?
        };
        catalog.ensure_structure();
        info!(path = %path.display(), "catalog loaded");
        catalog.path = path;
        Ok(catalog)
    }

    /// Like [`load`](Self::load), but a missing file yields a fresh catalog
    /// bound to `path`.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            return Self::load(path);
        }
        debug!(path = %path.display(), "no catalog file, starting empty");
        Ok(Self {
            path,
            ..Catalog::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the whole catalog, backing up the previous file first when
    /// backups are enabled.
    pub fn save(&self) -> Result<()> {
        if self.settings.backup_enabled && self.path.exists() {
            self.backup()?;
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut text = serde_yaml::to_string(self).map_err(CatalogError::Serialize)?;
        text.push_str(FOOTER);
        fs::write(&self.path, text).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "catalog saved");
        Ok(())
    }

    fn backup(&self) -> Result<PathBuf> {
        let dir = &self.settings.backup_path;
        fs::create_dir_all(dir).map_err(|source| CatalogError::Io {
            path: dir.clone(),
            source,
        })?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = dir.join(format!("config_backup_{stamp}.yaml"));
        fs::copy(&self.path, &target).map_err(|source| CatalogError::Io {
            path: target.clone(),
            source,
        })?;
        debug!(backup = %target.display(), "catalog backed up");
        Ok(target)
    }

    fn ensure_structure(&mut self) {
        if self.version.is_empty() {
            self.version = CURRENT_VERSION.to_string();
        }
        if self.settings.default_category.is_empty() {
            self.settings.default_category = Settings::default().default_category;
        }
        self.scripts
            .entry(self.settings.default_category.clone())
            .or_default();
        for (category, scripts) in &mut self.scripts {
            for script in scripts.iter_mut().filter(|s| s.category.is_empty()) {
                script.category = category.clone();
            }
        }
    }

    /// Category names in display order: the saved order first, then the
    /// remaining categories by name.
    pub fn category_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::with_capacity(self.scripts.len());
        for name in &self.settings.category_order {
            if self.scripts.contains_key(name) && !order.contains(&name.as_str()) {
                order.push(name);
            }
        }
        for name in self.scripts.keys() {
            if !order.contains(&name.as_str()) {
                order.push(name);
            }
        }
        order
    }

    /// Categories with their scripts, in [display order](Self::category_order).
    pub fn categories(&self) -> impl Iterator<Item = (&str, &[ScriptDescriptor])> {
        self.category_order()
            .into_iter()
            .map(move |name| (name, self.scripts[name].as_slice()))
    }

    pub fn scripts(&self) -> impl Iterator<Item = &ScriptDescriptor> {
        self.scripts.values().flatten()
    }

    fn locate(&self, name: &str, category: Option<&str>) -> Result<(String, usize)> {
        let not_found = || CatalogError::ScriptNotFound {
            name: name.to_string(),
        };
        if let Some(category) = category {
            let index = self
                .scripts
                .get(category)
                .and_then(|scripts| scripts.iter().position(|s| s.name == name))
                .ok_or_else(not_found)?;
            return Ok((category.to_string(), index));
        }

        let mut hits: Vec<(String, usize)> = self
            .scripts
            .iter()
            .filter_map(|(cat, scripts)| {
                let index = scripts.iter().position(|s| s.name == name)?;
                Some((cat.clone(), index))
            })
            .collect();
        match hits.len() {
            0 => Err(not_found()),
            1 => Ok(hits.remove(0)),
            _ => Err(CatalogError::AmbiguousScript {
                name: name.to_string(),
                categories: hits.into_iter().map(|(cat, _)| cat).collect(),
            }),
        }
    }

    /// Finds a script by name. Without a category the name must be unique
    /// across the whole catalog.
    pub fn find_script(&self, name: &str, category: Option<&str>) -> Result<&ScriptDescriptor> {
        let (category, index) = self.locate(name, category)?;
        Ok(&self.scripts[&category][index])
    }

    fn find_script_mut(
        &mut self,
        name: &str,
        category: Option<&str>,
    ) -> Result<&mut ScriptDescriptor> {
        let (category, index) = self.locate(name, category)?;
        self.scripts
            .get_mut(&category)
            .and_then(|scripts| scripts.get_mut(index))
            .ok_or_else(|| CatalogError::ScriptNotFound {
                name: name.to_string(),
            })
    }

    /// Adds a script to its category, creating the category if needed. An
    /// empty category means the default one.
    pub fn add_script(&mut self, mut script: ScriptDescriptor) -> Result<()> {
        if script.category.trim().is_empty() {
            script.category = self.settings.default_category.clone();
        }
        let scripts = self.scripts.entry(script.category.clone()).or_default();
        if scripts.iter().any(|s| s.name == script.name) {
            return Err(CatalogError::DuplicateScript {
                name: script.name,
                category: script.category,
            });
        }
        debug!(name = %script.name, category = %script.category, "script added");
        scripts.push(script);
        Ok(())
    }

    pub fn remove_script(
        &mut self,
        name: &str,
        category: Option<&str>,
    ) -> Result<ScriptDescriptor> {
        let (category, index) = self.locate(name, category)?;
        let scripts = self
            .scripts
            .get_mut(&category)
            .ok_or_else(|| CatalogError::ScriptNotFound {
                name: name.to_string(),
            })?;
        Ok(scripts.remove(index))
    }

    /// Edits a script in place. The edit may rename the script or move it to
    /// another category (an empty category means the default one); either
    /// fails if the target category already holds a script of that name.
    pub fn update_script(
        &mut self,
        name: &str,
        category: Option<&str>,
        edit: impl FnOnce(&mut ScriptDescriptor),
    ) -> Result<()> {
        let (from, index) = self.locate(name, category)?;
        let mut script = self.scripts[&from][index].clone();
        edit(&mut script);
        if script.name.trim().is_empty() {
            return Err(CatalogError::EmptyName { what: "script" });
        }
        if script.category.trim().is_empty() {
            script.category = self.settings.default_category.clone();
        }

        let taken = self.scripts.get(&script.category).is_some_and(|scripts| {
            scripts
                .iter()
                .enumerate()
                .any(|(i, s)| s.name == script.name && !(script.category == from && i == index))
        });
        if taken {
            return Err(CatalogError::DuplicateScript {
                name: script.name,
                category: script.category,
            });
        }

        debug!(name = %script.name, category = %script.category, "script updated");
        if script.category == from {
            if let Some(slot) = self.scripts.get_mut(&from).and_then(|s| s.get_mut(index)) {
                *slot = script;
            }
        } else {
            if let Some(scripts) = self.scripts.get_mut(&from) {
                scripts.remove(index);
            }
            self.scripts
                .entry(script.category.clone())
                .or_default()
                .push(script);
        }
        Ok(())
    }

    /// Adds an empty category.
    pub fn add_category(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName { what: "category" });
        }
        if self.scripts.contains_key(name) {
            return Err(CatalogError::CategoryExists {
                name: name.to_string(),
            });
        }
        self.scripts.insert(name.to_string(), Vec::new());
        if !self.settings.category_order.is_empty() {
            self.settings.category_order.push(name.to_string());
        }
        Ok(())
    }

    /// Renames a category, keeping its place in the display order. Its
    /// scripts are moved along and the default category follows the rename.
    pub fn rename_category(&mut self, from: &str, to: &str) -> Result<()> {
        let to = to.trim();
        if to.is_empty() {
            return Err(CatalogError::EmptyName { what: "category" });
        }
        if self.scripts.contains_key(to) {
            return Err(CatalogError::CategoryExists {
                name: to.to_string(),
            });
        }
        let mut scripts = self
            .scripts
            .remove(from)
            .ok_or_else(|| CatalogError::CategoryMissing {
                name: from.to_string(),
            })?;
        for script in &mut scripts {
            script.category = to.to_string();
        }
        self.scripts.insert(to.to_string(), scripts);

        for entry in &mut self.settings.category_order {
            if entry == from {
                *entry = to.to_string();
            }
        }
        if self.settings.default_category == from {
            self.settings.default_category = to.to_string();
        }
        info!(from, to, "category renamed");
        Ok(())
    }

    /// Removes a category, moving its scripts to the default category. The
    /// default category itself cannot be removed.
    ///
    /// Returns how many scripts were moved.
    pub fn remove_category(&mut self, name: &str) -> Result<usize> {
        let default = self.settings.default_category.clone();
        if name == default {
            return Err(CatalogError::DefaultCategory {
                name: name.to_string(),
            });
        }
        let moving = self
            .scripts
            .get(name)
            .ok_or_else(|| CatalogError::CategoryMissing {
                name: name.to_string(),
            })?;
        let target = self.scripts.get(&default);
        if let Some(clash) = moving
            .iter()
            .find(|s| target.is_some_and(|t| t.iter().any(|d| d.name == s.name)))
        {
            return Err(CatalogError::DuplicateScript {
                name: clash.name.clone(),
                category: default,
            });
        }

        let mut scripts = self.scripts.remove(name).unwrap_or_default();
        for script in &mut scripts {
            script.category = default.clone();
        }
        let moved = scripts.len();
        self.scripts.entry(default).or_default().extend(scripts);
        self.settings.category_order.retain(|entry| entry != name);
        info!(name, moved, "category removed");
        Ok(moved)
    }

    /// Stores the display order of categories. Every name must exist;
    /// categories left out follow in name order.
    pub fn set_category_order<I, S>(&mut self, order: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stored: Vec<String> = Vec::new();
        for name in order {
            let name = name.into();
            if !self.scripts.contains_key(&name) {
                return Err(CatalogError::CategoryMissing { name });
            }
            if !stored.contains(&name) {
                stored.push(name);
            }
        }
        self.settings.category_order = stored;
        Ok(())
    }

    pub fn environments(&self) -> &EnvironmentRegistry {
        &self.python_environments
    }

    pub fn add_environment(&mut self, env: EnvironmentDescriptor) -> Result<()> {
        if self.python_environments.get(&env.name).is_some() {
            return Err(CatalogError::EnvironmentExists { name: env.name });
        }
        self.python_environments.insert(env);
        Ok(())
    }

    /// Edits an environment in place. A rename must not collide with another
    /// environment; scripts and the default setting naming the old name are
    /// pointed at the new one.
    pub fn update_environment(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut EnvironmentDescriptor),
    ) -> Result<()> {
        let missing = || CatalogError::EnvironmentMissing {
            name: name.to_string(),
        };
        let mut env = self.python_environments.get(name).ok_or_else(missing)?.clone();
        edit(&mut env);
        if env.name.trim().is_empty() {
            return Err(CatalogError::EmptyName {
                what: "environment",
            });
        }
        let renamed = env.name != name;
        if renamed && self.python_environments.get(&env.name).is_some() {
            return Err(CatalogError::EnvironmentExists { name: env.name });
        }

        if renamed {
            for script in self.scripts.values_mut().flatten() {
                if script.env.as_deref() == Some(name) {
                    script.env = Some(env.name.clone());
                }
            }
            if self.settings.default_environment == name {
                self.settings.default_environment = env.name.clone();
            }
        }
        debug!(name = %env.name, "environment updated");
        *self.python_environments.get_mut(name).ok_or_else(missing)? = env;
        Ok(())
    }

    /// Removes an environment. Scripts still naming it keep the reference
    /// and fail at launch time.
    pub fn remove_environment(&mut self, name: &str) -> Result<EnvironmentDescriptor> {
        let removed = self
            .python_environments
            .remove(name)
            .ok_or_else(|| CatalogError::EnvironmentMissing {
                name: name.to_string(),
            })?;
        if self.settings.default_environment == name {
            self.settings.default_environment.clear();
        }
        Ok(removed)
    }

    /// Writes saved-default changes into a script record. Returns whether
    /// anything was applied; the caller decides when to [`save`](Self::save).
    pub fn apply_defaults(
        &mut self,
        name: &str,
        category: Option<&str>,
        update: DefaultsUpdate,
    ) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        let script = self.find_script_mut(name, category)?;
        update.apply_to(script);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ScriptKind;
    use tempfile::tempdir;

    fn script(name: &str, category: &str) -> ScriptDescriptor {
        let mut s = ScriptDescriptor::new(name, format!("/srv/{name}.py"), ScriptKind::Interpreted);
        s.category = category.to_string();
        s
    }

    fn catalog_in(dir: &Path) -> Catalog {
        let mut catalog = Catalog::load_or_default(dir.join("catalog.yaml")).unwrap();
        catalog.settings.backup_path = dir.join("backups");
        catalog
    }

    #[test]
    fn missing_file_gives_default_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load_or_default(dir.path().join("none.yaml")).unwrap();
        let categories: Vec<&str> = catalog.categories().map(|(c, _)| c).collect();
        assert_eq!(categories, ["Other"]);
        assert_eq!(catalog.version, "1.0");
        assert!(catalog.environments().is_empty());
        assert!(matches!(
            Catalog::load(dir.path().join("none.yaml")),
            Err(CatalogError::Io { .. })
        ));
    }

    #[test]
    fn reads_partial_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        fs::write(
            &path,
            "scripts:\n  Tools:\n  - name: report\n    path: /srv/report.py\n    env: base\npython_environments:\n- name: base\n  path: /usr/bin/python3\n",
        )
        .unwrap();
        let catalog = Catalog::load(&path).unwrap();
        let report = catalog.find_script("report", None).unwrap();
        assert_eq!(report.category, "Tools");
        assert_eq!(report.kind, ScriptKind::Interpreted);
        assert!(catalog.environments().get("base").is_some());
        assert_eq!(catalog.settings.default_category, "Other");
        assert_eq!(catalog.categories().count(), 2);
    }

    #[test]
    fn empty_file_is_a_default_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        fs::write(&path, "\n").unwrap();
        assert_eq!(Catalog::load(&path).unwrap().categories().count(), 1);
    }

    #[test]
    fn broken_yaml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        fs::write(&path, "scripts: [unclosed\n").unwrap();
        assert!(matches!(
            Catalog::load_or_default(&path),
            Err(CatalogError::Parse { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_content_and_backs_up() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("report", "Tools")).unwrap();
        catalog
            .add_environment(EnvironmentDescriptor::new("base", "/usr/bin/python3"))
            .unwrap();
        catalog.save().unwrap();
        assert!(!dir.path().join("backups").exists());

        let text = fs::read_to_string(catalog.path()).unwrap();
        assert!(text.contains("script_type: python"));
        assert!(text.ends_with(FOOTER));

        let mut reloaded = Catalog::load(catalog.path()).unwrap();
        reloaded.settings.backup_path = dir.path().join("backups");
        assert_eq!(reloaded.find_script("report", Some("Tools")).unwrap().name, "report");
        assert_eq!(reloaded.environments(), catalog.environments());

        reloaded.save().unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("config_backup_") && backups[0].ends_with(".yaml"));
    }

    #[test]
    fn backups_can_be_disabled() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.settings.backup_enabled = false;
        catalog.save().unwrap();
        catalog.save().unwrap();
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn lookup_by_name_and_category() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        catalog.add_script(script("build", "Ops")).unwrap();
        catalog.add_script(script("lint", "")).unwrap();

        assert_eq!(catalog.find_script("lint", None).unwrap().category, "Other");
        assert_eq!(catalog.find_script("build", Some("Ops")).unwrap().category, "Ops");
        match catalog.find_script("build", None) {
            Err(CatalogError::AmbiguousScript { categories, .. }) => {
                assert_eq!(categories, ["Dev", "Ops"])
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            catalog.find_script("build", Some("Other")),
            Err(CatalogError::ScriptNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_names_in_a_category_are_rejected() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        assert!(matches!(
            catalog.add_script(script("build", "Dev")),
            Err(CatalogError::DuplicateScript { .. })
        ));
    }

    #[test]
    fn remove_script_and_environment() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        assert_eq!(catalog.remove_script("build", None).unwrap().name, "build");
        assert!(catalog.find_script("build", None).is_err());

        catalog
            .add_environment(EnvironmentDescriptor::new("base", "/usr/bin/python3"))
            .unwrap();
        catalog.settings.default_environment = "base".to_string();
        assert!(matches!(
            catalog.add_environment(EnvironmentDescriptor::new("base", "/other")),
            Err(CatalogError::EnvironmentExists { .. })
        ));
        catalog.remove_environment("base").unwrap();
        assert_eq!(catalog.settings.default_environment, "");
        assert!(matches!(
            catalog.remove_environment("base"),
            Err(CatalogError::EnvironmentMissing { .. })
        ));
    }

    #[test]
    fn apply_defaults_updates_the_stored_record() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("report", "Tools")).unwrap();

        assert!(!catalog
            .apply_defaults("report", Some("Tools"), DefaultsUpdate::default())
            .unwrap());

        let update = DefaultsUpdate {
            arguments: Some("--fast".to_string()),
            show_output: Some(true),
            ..Default::default()
        };
        assert!(catalog.apply_defaults("report", Some("Tools"), update).unwrap());
        let stored = catalog.find_script("report", Some("Tools")).unwrap();
        assert_eq!(stored.defaults.arguments.as_deref(), Some("--fast"));
        assert_eq!(stored.defaults.show_output, Some(true));
    }

    #[test]
    fn foreign_keys_survive_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        fs::write(
            &path,
            "\
version: 1.0
scripts:
  Tools:
  - name: report
    path: /srv/report.py
    env: base
    arguments: --fast
    tags: [nightly, reports]
    shortcut: Ctrl+R
python_environments:
- name: base
  path: /usr/bin/python3
  is_default: true
  packages:
  - requests
settings:
  backup_enabled: false
  category_order: [Tools, Other]
  window_size: 1000x600
ui_theme: dark
",
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.version, "1.0");
        assert_eq!(catalog.settings.category_order, ["Tools", "Other"]);
        catalog.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        for key in [
            "tags:",
            "shortcut: Ctrl+R",
            "is_default: true",
            "packages:",
            "window_size: 1000x600",
            "category_order:",
            "ui_theme: dark",
        ] {
            assert!(text.contains(key), "{key} lost:\n{text}");
        }
        assert_eq!(text.matches("arguments:").count(), 1);

        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded, catalog);
        let report = reloaded.find_script("report", Some("Tools")).unwrap();
        assert_eq!(report.defaults.arguments.as_deref(), Some("--fast"));
        assert!(report.extra.contains_key("tags"));
    }

    #[test]
    fn edit_renames_and_moves_scripts() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        catalog.add_script(script("lint", "Dev")).unwrap();
        catalog.add_script(script("build", "Ops")).unwrap();

        catalog
            .update_script("lint", None, |s| {
                s.name = "check".to_string();
                s.description = "static checks".to_string();
            })
            .unwrap();
        let check = catalog.find_script("check", Some("Dev")).unwrap();
        assert_eq!(check.description, "static checks");
        assert!(catalog.find_script("lint", None).is_err());

        // Moving into a category that already holds the name is refused.
        let moved = catalog.update_script("build", Some("Dev"), |s| s.category = "Ops".into());
        assert!(matches!(moved, Err(CatalogError::DuplicateScript { .. })));
        assert_eq!(catalog.find_script("build", Some("Dev")).unwrap().category, "Dev");

        catalog
            .update_script("check", None, |s| s.category = String::new())
            .unwrap();
        let check = catalog.find_script("check", None).unwrap();
        assert_eq!(check.category, "Other");
        assert_eq!(catalog.categories().find(|(c, _)| *c == "Dev").unwrap().1.len(), 1);

        // Keeping the same name in the same category is not a clash.
        catalog
            .update_script("build", Some("Ops"), |s| s.env = Some("base".into()))
            .unwrap();
        assert!(matches!(
            catalog.update_script("build", Some("Ops"), |s| s.name = " ".into()),
            Err(CatalogError::EmptyName { .. })
        ));
    }

    #[test]
    fn edit_environment_follows_renames() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog
            .add_environment(EnvironmentDescriptor::new("base", "/usr/bin/python3"))
            .unwrap();
        catalog
            .add_environment(EnvironmentDescriptor::new("venv", "/srv/venv/bin/python"))
            .unwrap();
        catalog.settings.default_environment = "base".to_string();
        let mut report = script("report", "Tools");
        report.env = Some("base".to_string());
        catalog.add_script(report).unwrap();

        assert!(matches!(
            catalog.update_environment("base", |e| e.name = "venv".into()),
            Err(CatalogError::EnvironmentExists { .. })
        ));
        catalog
            .update_environment("base", |e| {
                e.name = "system".to_string();
                e.description = "distro python".to_string();
            })
            .unwrap();

        let env = catalog.environments().get("system").unwrap();
        assert_eq!(env.description, "distro python");
        assert!(catalog.environments().get("base").is_none());
        assert_eq!(catalog.settings.default_environment, "system");
        let report = catalog.find_script("report", None).unwrap();
        assert_eq!(report.env.as_deref(), Some("system"));
        assert!(matches!(
            catalog.update_environment("base", |_| {}),
            Err(CatalogError::EnvironmentMissing { .. })
        ));
    }

    #[test]
    fn categories_can_be_added_renamed_and_removed() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        catalog.add_category("Ops").unwrap();
        assert!(matches!(
            catalog.add_category("Dev"),
            Err(CatalogError::CategoryExists { .. })
        ));
        assert!(matches!(
            catalog.add_category("  "),
            Err(CatalogError::EmptyName { .. })
        ));

        catalog.set_category_order(["Ops", "Dev"]).unwrap();
        catalog.rename_category("Dev", "Build").unwrap();
        assert_eq!(catalog.category_order(), ["Ops", "Build", "Other"]);
        assert_eq!(catalog.find_script("build", None).unwrap().category, "Build");
        assert!(matches!(
            catalog.rename_category("Dev", "Again"),
            Err(CatalogError::CategoryMissing { .. })
        ));

        assert_eq!(catalog.remove_category("Build").unwrap(), 1);
        assert_eq!(catalog.find_script("build", None).unwrap().category, "Other");
        assert_eq!(catalog.settings.category_order, ["Ops"]);
        assert!(matches!(
            catalog.remove_category("Other"),
            Err(CatalogError::DefaultCategory { .. })
        ));
    }

    #[test]
    fn removing_a_category_refuses_name_clashes() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.add_script(script("build", "Dev")).unwrap();
        catalog.add_script(script("build", "")).unwrap();
        assert!(matches!(
            catalog.remove_category("Dev"),
            Err(CatalogError::DuplicateScript { .. })
        ));
        assert!(catalog.find_script("build", Some("Dev")).is_ok());
    }

    #[test]
    fn renaming_the_default_category_moves_the_default() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        catalog.rename_category("Other", "Misc").unwrap();
        assert_eq!(catalog.settings.default_category, "Misc");
        catalog.add_script(script("lint", "")).unwrap();
        assert_eq!(catalog.find_script("lint", None).unwrap().category, "Misc");
    }

    #[test]
    fn display_order_puts_saved_order_first() {
        let dir = tempdir().unwrap();
        let mut catalog = catalog_in(dir.path());
        for category in ["Zeta", "Alpha", "Mid"] {
            catalog.add_category(category).unwrap();
        }
        assert_eq!(catalog.category_order(), ["Alpha", "Mid", "Other", "Zeta"]);

        catalog.set_category_order(["Zeta", "Other"]).unwrap();
        let listed: Vec<&str> = catalog.categories().map(|(c, _)| c).collect();
        assert_eq!(listed, ["Zeta", "Other", "Alpha", "Mid"]);
        assert!(matches!(
            catalog.set_category_order(["Nope"]),
            Err(CatalogError::CategoryMissing { .. })
        ));

        // Stale entries left in the file are skipped.
        catalog.settings.category_order.push("Gone".to_string());
        assert_eq!(catalog.category_order().len(), 4);
    }
}
