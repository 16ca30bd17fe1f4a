//! Infrastructure layer of the JN ETL substrate: plugin discovery, profile
//! resolution, pipeline assembly, and child-process execution. Pairs with
//! `jn-core`'s pure domain types the way the teacher pairs `gauss-api`
//! (pure) with `gauss-engine` (async, I/O-bearing).

pub mod atomic;
pub mod builder;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod logging;
pub mod profile_resolver;

use jn_core::address::{self, Address};
use jn_core::pipeline::StageResult;
use jn_core::{PluginDescriptor, Registry, Role};
use tracing::info;

pub use config::RuntimeConfig;
pub use error::EngineError;

use builder::Builder;
use profile_resolver::ProfileResolver;

/// A bootstrapped JN runtime: the plugin registry discovered once at
/// startup plus the resolver used for every `@namespace/name` address
/// encountered afterward. Passed around explicitly rather than held in
/// global state (spec.md §9, "Global mutable state").
pub struct Runtime {
    pub config: RuntimeConfig,
    pub registry: Registry,
    profiles: ProfileResolver,
}

impl Runtime {
    pub async fn bootstrap(config: RuntimeConfig) -> Result<Self, EngineError> {
        let registry = discovery::discover(&config).await?;
        info!(plugin_count = registry.len(), "plugin discovery complete");
        let profiles = ProfileResolver::new(&config);
        Ok(Self { config, registry, profiles })
    }

    pub async fn rescan(&mut self) -> Result<(), EngineError> {
        discovery::invalidate_cache(&self.config)?;
        self.registry = discovery::discover(&self.config).await?;
        Ok(())
    }

    /// Run a read pipeline for `raw_address`, streaming NDJSON to this
    /// process's own stdout (spec.md §6.4, "jn get").
    pub async fn get(&self, raw_address: &str) -> Result<Vec<StageResult>, EngineError> {
        let address = address::parse(raw_address)?;
        let profile = self.resolve_profile(&address)?;
        let params = Builder::effective_parameters(&address, profile.as_ref());
        let pipeline = Builder::new(&self.registry).build_read(&address, &params, profile.as_ref())?;
        executor::execute(pipeline, executor::shutdown_signal()).await
    }

    /// Run a write pipeline for `raw_address`, reading NDJSON from this
    /// process's own stdin (spec.md §6.4, "jn put"). The sink only becomes
    /// visible at its final path once every stage has exited successfully.
    pub async fn put(&self, raw_address: &str) -> Result<Vec<StageResult>, EngineError> {
        let address = address::parse(raw_address)?;
        let profile = self.resolve_profile(&address)?;
        let params = Builder::effective_parameters(&address, profile.as_ref());
        let plan = Builder::new(&self.registry).build_write(&address, &params, profile.as_ref())?;

        let results = executor::execute(plan.pipeline, executor::shutdown_signal()).await?;

        if let Some((tmp, dest)) = plan.atomic_rename {
            tokio::fs::rename(&tmp, &dest).await.map_err(|e| {
                EngineError::Config(format!("{}: atomic rename from {} failed: {e}", dest.display(), tmp.display()))
            })?;
        }

        Ok(results)
    }

    pub fn plugins(&self, role: Role) -> &[PluginDescriptor] {
        self.registry.all(role)
    }

    /// Describe how `raw_address` would be resolved without running
    /// anything (spec.md's supplemented `jn inspect` command).
    pub fn inspect(&self, raw_address: &str) -> Result<Address, EngineError> {
        Ok(address::parse(raw_address)?)
    }

    fn resolve_profile(&self, address: &Address) -> Result<Option<jn_core::Profile>, EngineError> {
        match &address.profile_ref {
            Some(r) => {
                let profile = self.profiles.resolve(&r.namespace, &r.name, &self.config.env)?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }
}
