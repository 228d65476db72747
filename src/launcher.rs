use crate::env::EnvironmentRegistry;
use crate::error::Result;
use crate::registry::RunnerRegistry;
use crate::script::{LaunchRequest, ScriptDescriptor};
use crate::session::ProcessSession;
use tracing::info;

/// Entry point for starting scripts: picks the runner for the script's kind
/// and hands it the request.
#[derive(Default)]
pub struct Launcher {
    registry: RunnerRegistry,
}

impl Launcher {
    pub fn new(registry: RunnerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RunnerRegistry {
        &mut self.registry
    }

    /// Starts `script` as described by `request`.
    ///
    /// An environment override applies to this launch only; `script` itself
    /// is left untouched.
    pub fn run(
        &self,
        script: &ScriptDescriptor,
        environments: &EnvironmentRegistry,
        request: &LaunchRequest,
    ) -> Result<ProcessSession> {
        let factory = self.registry.get_runner(&script.kind)?;

        let mut resolved = script.clone();
        if let Some(env) = &request.environment_override {
            resolved.env = Some(env.clone());
        }

        info!(name = %script.name, kind = %script.kind, "launching script");
        factory.create(resolved, environments).run(request)
    }
}
