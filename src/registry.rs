use crate::command::{RunnerFactory, ScriptRunner};
use crate::env::EnvironmentRegistry;
use crate::error::{LaunchError, Result};
use crate::kind::ScriptKind;
use crate::runners::{
    BatchRunner, BuiltinRunner, ExecutableRunner, InterpretedRunner, ShellScriptRunner,
};
use crate::script::ScriptDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory creating instances of a built-in runner.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Maps script kinds to runner factories.
///
/// [`RunnerRegistry::default`] knows the four built-in kinds; further kinds
/// are added with [`RunnerRegistry::register_runner`].
pub struct RunnerRegistry {
    factories: HashMap<ScriptKind, Arc<dyn RunnerFactory>>,
}

impl RunnerRegistry {
    /// A registry with no runners at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    fn register_builtin<T: BuiltinRunner>(&mut self) {
        self.factories
            .insert(T::kind(), Arc::new(Factory::<T>::default()));
    }

    /// Looks up the factory for `kind`.
    pub fn get_runner(&self, kind: &ScriptKind) -> Result<Arc<dyn RunnerFactory>> {
        self.factories
            .get(kind)
            .cloned()
            .ok_or_else(|| LaunchError::UnsupportedKind { kind: kind.clone() })
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register_runner(&mut self, kind: ScriptKind, factory: impl RunnerFactory + 'static) {
        tracing::debug!(%kind, "registering runner");
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Creates a runner for `script` with the factory registered for its kind.
    pub fn create(
        &self,
        script: ScriptDescriptor,
        environments: &EnvironmentRegistry,
    ) -> Result<Box<dyn ScriptRunner>> {
        let factory = self.get_runner(&script.kind)?;
        Ok(factory.create(script, environments))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ScriptKind> {
        self.factories.keys()
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin::<InterpretedRunner>();
        registry.register_builtin::<BatchRunner>();
        registry.register_builtin::<ShellScriptRunner>();
        registry.register_builtin::<ExecutableRunner>();
        registry
    }
}
